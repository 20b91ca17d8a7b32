use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation identifier grouping every cycle of one conversation.
///
/// Opaque to everything except the backend, which keys its chat memory on it.
/// Serializes as the bare UUID string so it round-trips unchanged through
/// request bodies and saved conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh identifier for a new conversation.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Replace this identifier with a fresh one, starting a new conversation.
    pub fn rotate(&mut self) {
        *self = Self::new();
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sessions_are_distinct() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_rotate_changes_id() {
        let mut id = SessionId::new();
        let before = id;
        id.rotate();
        assert_ne!(id, before);
    }

    #[test]
    fn test_display_parse_roundtrip() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = SessionId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not-a-session".parse::<SessionId>().is_err());
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ragbot_core::{SessionId, Transcript};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A saved conversation: the session the backend keys its memory on plus
/// the transcript shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Conversation id sent to the service with every question
    pub id: SessionId,
    /// Human-readable name, derived from the first question
    pub name: String,
    /// Service the conversation was held with
    pub server_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub transcript: Transcript,
}

impl Session {
    pub fn new(server_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            name: now.format("%Y%m%d-%H%M%S").to_string(),
            server_url: server_url.into(),
            created_at: now,
            updated_at: now,
            transcript: Transcript::new(),
        }
    }

    /// Begin a fresh conversation with the same service under a new id.
    pub fn start_over(&mut self) {
        let fresh = Self::new(std::mem::take(&mut self.server_url));
        let mut id = self.id;
        id.rotate();
        *self = Self { id, ..fresh };
    }

    /// Update the session name based on the first question.
    pub fn update_name_from_first_question(&mut self) {
        let first = self.transcript.iter().find(|turn| turn.is_user());
        if let Some(turn) = first {
            let sanitized = sanitize_session_name(turn.text());
            if !sanitized.is_empty() {
                self.name = sanitized;
            }
        }
    }

    /// Number of user questions asked so far.
    pub fn question_count(&self) -> usize {
        self.transcript.iter().filter(|turn| turn.is_user()).count()
    }
}

/// Directory of saved conversations, one `<id>.json` file each.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create sessions dir: {}", self.dir.display())
        })?;
        Ok(&self.dir)
    }

    fn file_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Stamp `updated_at` and write the session to disk.
    pub fn save(&self, session: &mut Session) -> Result<()> {
        self.ensure_dir()?;
        session.updated_at = Utc::now();
        let path = self.file_path(&session.id);
        let json = serde_json::to_string_pretty(session).context("failed to serialize session")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write session: {}", path.display()))?;
        debug!(id = %session.id, path = %path.display(), "Session saved");
        Ok(())
    }

    /// Load a session by exact id, id prefix or name fragment.
    pub fn load(&self, id_or_name: &str) -> Result<Session> {
        self.ensure_dir()?;

        // Only a well-formed id ever becomes part of a file path.
        if let Ok(id) = id_or_name.parse::<SessionId>() {
            let exact_path = self.file_path(&id);
            if exact_path.exists() {
                return load_from_path(&exact_path);
            }
        }

        let needle = id_or_name.to_lowercase();
        let mut matches: Vec<Session> = self
            .read_all()?
            .into_iter()
            .filter(|session| {
                session.id.to_string().starts_with(&needle)
                    || session.name.to_lowercase().contains(&needle)
            })
            .collect();

        match matches.len() {
            0 => anyhow::bail!("no session found matching '{}'", id_or_name),
            1 => Ok(matches.remove(0)),
            n => anyhow::bail!(
                "ambiguous session '{}': {} matches found. Use a more specific identifier.",
                id_or_name,
                n
            ),
        }
    }

    /// List all saved sessions, sorted by most recent first.
    pub fn list_all(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .read_all()?
            .iter()
            .map(SessionSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Every readable session file; unreadable ones are skipped.
    fn read_all(&self) -> Result<Vec<Session>> {
        let sessions_dir = self.ensure_dir()?;
        let entries =
            std::fs::read_dir(sessions_dir).context("failed to read sessions directory")?;

        let mut sessions = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match load_from_path(&path) {
                    Ok(session) => sessions.push(session),
                    Err(e) => debug!(path = %path.display(), error = %e, "Skipping session file"),
                }
            }
        }
        Ok(sessions)
    }
}

fn load_from_path(path: &Path) -> Result<Session> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session: {}", path.display()))?;
    let session: Session = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse session: {}", path.display()))?;
    Ok(session)
}

/// Lightweight summary of a session for listing.
#[derive(Debug)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub updated_at: DateTime<Utc>,
    pub question_count: usize,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            name: session.name.clone(),
            updated_at: session.updated_at,
            question_count: session.question_count(),
        }
    }
}

/// Sanitize a question into a session name.
/// Takes the first ~50 chars, replaces non-alphanumeric with dashes, lowercases.
fn sanitize_session_name(text: &str) -> String {
    let mut result = String::new();
    let mut prev_dash = false;
    for c in text.chars().take(50) {
        if c.is_alphanumeric() || c == '_' {
            result.extend(c.to_lowercase());
            prev_dash = false;
        } else if !prev_dash && !result.is_empty() {
            result.push('-');
            prev_dash = true;
        }
    }
    result.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_asking(store: &SessionStore, question: &str) -> Session {
        let mut session = Session::new("http://localhost:8000");
        session.transcript.push_user(question);
        session.update_name_from_first_question();
        store.save(&mut session).unwrap();
        session
    }

    #[test]
    fn test_sanitize_session_name() {
        assert_eq!(sanitize_session_name("Hello World!"), "hello-world");
        assert_eq!(
            sanitize_session_name("What is the capital of France?"),
            "what-is-the-capital-of-france"
        );
        assert_eq!(
            sanitize_session_name("   lots   of   spaces   "),
            "lots-of-spaces"
        );
        assert_eq!(sanitize_session_name("???"), "");
    }

    #[test]
    fn test_sanitize_long_name() {
        let long = "a".repeat(100);
        assert!(sanitize_session_name(&long).chars().count() <= 50);
    }

    #[test]
    fn test_session_new() {
        let session = Session::new("http://localhost:8000");
        assert!(session.transcript.is_empty());
        assert_eq!(session.question_count(), 0);
        assert_eq!(session.server_url, "http://localhost:8000");
    }

    #[test]
    fn test_start_over_rotates_id() {
        let mut session = Session::new("http://localhost:8000");
        session.transcript.push_user("What is the capital of France?");
        session.update_name_from_first_question();
        let old_id = session.id;

        session.start_over();
        assert_ne!(session.id, old_id);
        assert!(session.transcript.is_empty());
        assert_ne!(session.name, "what-is-the-capital-of-france");
        assert_eq!(session.server_url, "http://localhost:8000");
    }

    #[test]
    fn test_name_ignores_blank_question() {
        let mut session = Session::new("http://localhost:8000");
        let original = session.name.clone();
        session.transcript.push_user("?!");
        session.update_name_from_first_question();
        assert_eq!(session.name, original);
    }

    #[test]
    fn test_save_and_load_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let saved = session_asking(&store, "What is the capital of France?");

        let loaded = store.load(&saved.id.to_string()).unwrap();
        assert_eq!(loaded.id, saved.id);
        assert_eq!(loaded.name, "what-is-the-capital-of-france");
        assert_eq!(loaded.transcript, saved.transcript);
    }

    #[test]
    fn test_load_by_prefix_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let saved = session_asking(&store, "Summarize the annual report");

        let prefix = &saved.id.to_string()[..8];
        assert_eq!(store.load(prefix).unwrap().id, saved.id);
        assert_eq!(store.load("ANNUAL").unwrap().id, saved.id);
        assert!(store.load("nothing-like-this").is_err());
    }

    #[test]
    fn test_load_never_leaves_sessions_dir() {
        let root = tempfile::tempdir().unwrap();
        let store = SessionStore::new(root.path().join("sessions"));
        session_asking(&store, "inside question");

        let mut outside = Session::new("http://localhost:8000");
        outside.transcript.push_user("outside question");
        let json = serde_json::to_string(&outside).unwrap();
        std::fs::write(root.path().join("outside.json"), json).unwrap();

        assert!(store.load("../outside").is_err());
    }

    #[test]
    fn test_load_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        session_asking(&store, "report one");
        session_asking(&store, "report two");

        let err = store.load("report").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_list_all_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let older = session_asking(&store, "first question");
        let mut newer = session_asking(&store, "second question");
        newer.transcript.push_user("follow up");
        store.save(&mut newer).unwrap();

        std::fs::write(dir.path().join("garbage.json"), "not json").unwrap();

        let summaries = store.list_all().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, newer.id);
        assert_eq!(summaries[0].question_count, 2);
        assert_eq!(summaries[1].id, older.id);
    }
}

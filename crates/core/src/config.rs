use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Base URL of the RAG service when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Client configuration drawn from the environment.
///
/// `server_url` stays `None` unless the environment names one, so callers can
/// layer their own sources (flags, config files) underneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server_url: Option<String>,
    /// Upper bound for one upload or ingestion request.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated on an open answer stream.
    pub read_timeout_secs: u64,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RAGBOT_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RAGBOT_PROFILE", "");
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server_url: profiled_env_opt(p, "RAGBOT_SERVER_URL"),
            request_timeout_secs: profiled_env_u64(p, "RAGBOT_REQUEST_TIMEOUT_SECS", 300),
            connect_timeout_secs: profiled_env_u64(p, "RAGBOT_CONNECT_TIMEOUT_SECS", 5),
            read_timeout_secs: profiled_env_u64(p, "RAGBOT_READ_TIMEOUT_SECS", 300),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn log_summary(&self) {
        tracing::debug!(
            profile = self.profile_label(),
            server_url = self.server_url.as_deref().unwrap_or("(unset)"),
            request_timeout_secs = self.request_timeout_secs,
            connect_timeout_secs = self.connect_timeout_secs,
            read_timeout_secs = self.read_timeout_secs,
            "Config loaded"
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            server_url: None,
            request_timeout_secs: 300,
            connect_timeout_secs: 5,
            read_timeout_secs: 300,
        }
    }
}

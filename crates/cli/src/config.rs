use anyhow::{Context, Result};
use ragbot_core::config::DEFAULT_SERVER_URL;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// CLI configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default RAG service URL
    #[serde(default)]
    pub server_url: Option<String>,

    /// Print cited documents under each answer
    #[serde(default = "default_show_sources")]
    pub show_sources: bool,

    /// Number of most recent turns printed by `/history`
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Where saved conversations live (default: ~/.config/ragbot/sessions)
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
}

fn default_show_sources() -> bool {
    true
}

fn default_history_limit() -> usize {
    20
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            show_sources: default_show_sources(),
            history_limit: default_history_limit(),
            sessions_dir: None,
        }
    }
}

impl CliConfig {
    /// Return the default config directory path: ~/.config/ragbot/
    pub fn default_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("ragbot");
        Ok(config_dir)
    }

    /// Return the default config file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            debug!(?config_path, "Loading config");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config: {}", config_path.display()))?;
            let config: Self = toml::from_str(&content)
                .with_context(|| format!("failed to parse config: {}", config_path.display()))?;
            Ok(config)
        } else {
            debug!(?config_path, "Config file not found, using defaults");
            let config = Self::default();
            // Create directory and write default config
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let toml_str = toml::to_string_pretty(&config)
                .context("failed to serialize default config")?;
            std::fs::write(&config_path, toml_str).ok();
            Ok(config)
        }
    }

    /// Resolve the server URL.
    /// Priority: cli_override > environment > config file > built-in default.
    pub fn resolve_server_url(&self, cli_override: Option<&str>, from_env: Option<&str>) -> String {
        cli_override
            .or(from_env)
            .or(self.server_url.as_deref())
            .unwrap_or(DEFAULT_SERVER_URL)
            .trim_end_matches('/')
            .to_string()
    }

    /// Return the sessions directory path.
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        match &self.sessions_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::default_config_dir()?.join("sessions")),
        }
    }
}

use std::path::PathBuf;

use clap::Parser;

/// Terminal chat client for a retrieval-augmented question answering service.
///
/// Streams answers as they are generated and lists the documents each answer
/// was drawn from.
#[derive(Parser, Debug)]
#[command(name = "ragbot", about = "Ask questions about your PDFs")]
pub struct CliArgs {
    /// Base URL of the RAG service (overrides env var and config file)
    #[arg(long)]
    pub server: Option<String>,

    /// Path to config file (default: ~/.config/ragbot/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// Resume a previous conversation by ID, ID prefix or name
    #[arg(long)]
    pub session: Option<String>,

    /// List all saved conversations
    #[arg(long)]
    pub list_sessions: bool,

    /// Upload these PDF files and exit
    #[arg(long, num_args = 1..)]
    pub upload: Vec<PathBuf>,

    /// Trigger loading and embedding of uploaded PDFs and exit
    #[arg(long)]
    pub ingest: bool,

    /// Do not print the cited documents under each answer
    #[arg(long)]
    pub no_sources: bool,
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Upload(Vec<PathBuf>),
    Ingest,
    New,
    History,
    Help,
    Unknown(String),
}

impl ReplCommand {
    /// Lines starting with `/` are commands; anything else is a question.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let mut words = rest.split_whitespace();
        match words.next().unwrap_or_default() {
            "upload" => Self::Upload(words.map(PathBuf::from).collect()),
            "ingest" => Self::Ingest,
            "new" => Self::New,
            "history" => Self::History,
            "help" => Self::Help,
            other => Self::Unknown(other.to_string()),
        }
    }
}

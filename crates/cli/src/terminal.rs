use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use ragbot_client::RagClient;
use ragbot_core::citation::format_source;
use ragbot_core::{SessionId, Transcript, Turn};
use std::io::{self, Write};

use crate::session::SessionSummary;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const AGENT_TEXT: Color = Color::Cyan;
    const SOURCE: Color = Color::Yellow;
    const SUCCESS: Color = Color::DarkGreen;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Manages terminal I/O for the interactive REPL.
pub struct Terminal;

impl Terminal {
    pub fn new() -> Self {
        Self
    }

    /// Print the startup banner.
    pub fn print_banner(&self, server_url: &str, session_id: &SessionId) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("ragbot"),
            ResetColor,
            Print(" - Ask questions about your documents\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Server: {} | Session: {}\n", server_url, session_id)),
            Print("Type /help for commands, 'exit' or 'quit' to end. Ctrl+C stops an answer.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Read a line of user input with prompt.
    /// Returns None on end of input or when the user wants to exit.
    pub fn read_input(&self) -> Result<Option<String>> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::USER_PROMPT),
            Print("you> "),
            ResetColor,
        )?;
        stdout.flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let trimmed = input.trim();

        if is_exit_command(trimmed) {
            return Ok(None);
        }

        Ok(Some(trimmed.to_string()))
    }

    /// Print the label that precedes a streamed answer.
    pub fn start_answer(&self) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("bot> "),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print whatever part of `text` has not been printed yet.
    /// `printed` tracks how many bytes of the answer are already on screen.
    pub fn print_fragment(&self, printed: &mut usize, text: &str) -> Result<()> {
        let tail = unprinted_tail(text, *printed);
        if tail.is_empty() {
            return Ok(());
        }
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::AGENT_TEXT),
            Print(tail),
            ResetColor,
        )?;
        stdout.flush()?;
        *printed = text.len();
        Ok(())
    }

    pub fn end_answer(&self) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Print("\n"))?;
        stdout.flush()?;
        Ok(())
    }

    /// List the documents an answer cites, with links the service serves them under.
    pub fn print_sources(&self, turn: &Turn, client: &RagClient) -> Result<()> {
        if turn.citations().is_empty() {
            return Ok(());
        }
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print("Sources:\n"),
            ResetColor,
        )?;
        for source in turn.citations() {
            let link = client.document_url(source).ok().map(|url| url.to_string());
            execute!(
                stdout,
                SetForegroundColor(Colors::SOURCE),
                Print(source_line(source, link.as_deref())),
                ResetColor,
            )?;
        }
        stdout.flush()?;
        Ok(())
    }

    /// Print the last `limit` turns of a conversation.
    pub fn print_transcript(&self, transcript: &Transcript, limit: usize) -> Result<()> {
        let mut stdout = io::stdout();
        if transcript.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print("No questions asked yet.\n"),
                ResetColor,
            )?;
            return Ok(());
        }

        let skip = transcript.len().saturating_sub(limit);
        for turn in transcript.iter().skip(skip) {
            let (label, color) = if turn.is_user() {
                ("you> ", Colors::USER_PROMPT)
            } else {
                ("bot> ", Colors::AGENT_TEXT)
            };
            execute!(
                stdout,
                SetForegroundColor(color),
                Print(label),
                ResetColor,
                Print(format!("{}\n", turn.text())),
            )?;
            if !turn.citations().is_empty() {
                let names: Vec<&str> = turn.citations().iter().map(|s| format_source(s)).collect();
                execute!(
                    stdout,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("     [{}]\n", names.join(", "))),
                    ResetColor,
                )?;
            }
        }
        stdout.flush()?;
        Ok(())
    }

    pub fn print_help(&self) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print("/upload <file>...  upload PDF files\n"),
            Print("/ingest            load and embed uploaded PDFs\n"),
            Print("/new               start a fresh conversation\n"),
            Print("/history           show recent turns\n"),
            Print("exit, quit         leave\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print a session listing.
    pub fn print_sessions(&self, sessions: &[SessionSummary]) -> Result<()> {
        let mut stdout = io::stdout();
        if sessions.is_empty() {
            execute!(
                stdout,
                SetForegroundColor(Colors::DIM),
                Print("No saved sessions found.\n"),
                ResetColor,
            )?;
            return Ok(());
        }

        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("Saved Sessions:\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!(
                "{:<38} {:<40} {:<17} {:<5}\n",
                "ID", "NAME", "UPDATED", "QS"
            )),
            Print(format!("{}\n", "-".repeat(100))),
            ResetColor,
        )?;

        for s in sessions {
            execute!(
                stdout,
                Print(format!(
                    "{:<38} {:<40} {:<17} {:<5}\n",
                    s.id.to_string(),
                    truncate(&s.name, 38),
                    s.updated_at.format("%Y-%m-%d %H:%M"),
                    s.question_count,
                )),
            )?;
        }

        stdout.flush()?;
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        self.print_colored(Colors::ERROR, &format!("Error: {}", msg))
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        self.print_colored(Colors::DIM, msg)
    }

    pub fn print_success(&self, msg: &str) -> Result<()> {
        self.print_colored(Colors::SUCCESS, msg)
    }

    fn print_colored(&self, color: Color, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(color),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

fn is_exit_command(input: &str) -> bool {
    matches!(input, "exit" | "quit" | "/exit" | "/quit")
}

/// Answer text grows append-only, so everything past `printed` is new.
fn unprinted_tail(text: &str, printed: usize) -> &str {
    text.get(printed..).unwrap_or_default()
}

fn source_line(source: &str, link: Option<&str>) -> String {
    match link {
        Some(link) => format!("  - {} ({})\n", format_source(source), link),
        None => format!("  - {}\n", format_source(source)),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

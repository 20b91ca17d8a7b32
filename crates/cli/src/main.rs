mod cli;
mod config;
mod interrupt;
mod session;
mod terminal;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use ragbot_client::{CancellationToken, EventSource, RagClient, TurnDispatcher};
use ragbot_core::config::load_dotenv;
use ragbot_core::Config;

use crate::cli::{CliArgs, ReplCommand};
use crate::config::CliConfig;
use crate::interrupt::InterruptRouter;
use crate::session::{Session, SessionStore};
use crate::terminal::Terminal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let env_config = Config::from_env();
    env_config.log_summary();

    let args = CliArgs::parse();
    let terminal = Terminal::new();

    let config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let store = SessionStore::new(config.sessions_dir()?);

    if args.list_sessions {
        let sessions = store.list_all()?;
        terminal.print_sessions(&sessions)?;
        return Ok(());
    }

    let server_url = config.resolve_server_url(
        args.server.as_deref(),
        env_config.server_url.as_deref(),
    );
    let client = RagClient::with_config(&server_url, &env_config)
        .with_context(|| format!("invalid server URL '{}'", server_url))?;

    if !args.upload.is_empty() || args.ingest {
        if !args.upload.is_empty() {
            upload(&terminal, &client, &args.upload).await?;
        }
        if args.ingest {
            ingest(&terminal, &client).await?;
        }
        return Ok(());
    }

    if let Err(e) = client.health_check().await {
        warn!(error = %e, server = %server_url, "RAG service not reachable");
        terminal.print_error(&format!("cannot reach {} ({})", server_url, e))?;
    }

    let mut session = match args.session.as_deref() {
        Some(id_or_name) => {
            info!(session = %id_or_name, "Resuming session");
            let loaded = store
                .load(id_or_name)
                .with_context(|| format!("failed to load session '{}'", id_or_name))?;
            if loaded.server_url != server_url {
                warn!(
                    saved = %loaded.server_url,
                    current = %server_url,
                    "Resuming against a different server"
                );
            }
            terminal.print_info(&format!(
                "Resumed session: {} ({} questions)",
                loaded.name,
                loaded.question_count()
            ))?;
            loaded
        }
        None => Session::new(server_url.clone()),
    };

    let source: Arc<dyn EventSource> = Arc::new(client.clone());
    let dispatcher = TurnDispatcher::new(source);
    let show_sources = config.show_sources && !args.no_sources;

    // Every answer is saved as soon as it completes, so quitting from the
    // prompt loses nothing.
    let interrupts = InterruptRouter::new();
    interrupts.install(|| {
        Terminal::new().print_info("\nGoodbye.").ok();
        std::process::exit(130);
    });

    terminal.print_banner(&server_url, &session.id)?;

    // REPL loop
    loop {
        let input = match terminal.read_input()? {
            Some(text) => text,
            None => {
                terminal.print_info("Goodbye.")?;
                break;
            }
        };

        if input.is_empty() {
            continue;
        }

        match ReplCommand::parse(&input) {
            ReplCommand::Ask(question) => {
                let cancel = interrupts.start_answer();
                let outcome = ask(
                    &terminal,
                    &dispatcher,
                    &client,
                    &mut session,
                    &question,
                    cancel,
                    show_sources,
                )
                .await;
                interrupts.finish_answer();
                outcome?;
                session.update_name_from_first_question();
                if let Err(e) = store.save(&mut session) {
                    warn!(error = %e, "Failed to auto-save session");
                }
            }
            ReplCommand::Upload(paths) => {
                if let Err(e) = upload(&terminal, &client, &paths).await {
                    terminal.print_error(&format!("{:#}", e))?;
                }
            }
            ReplCommand::Ingest => {
                if let Err(e) = ingest(&terminal, &client).await {
                    terminal.print_error(&format!("{:#}", e))?;
                }
            }
            ReplCommand::New => {
                session.start_over();
                terminal.print_info(&format!("New session: {}", session.id))?;
            }
            ReplCommand::History => {
                terminal.print_transcript(&session.transcript, config.history_limit)?;
            }
            ReplCommand::Help => terminal.print_help()?,
            ReplCommand::Unknown(command) => {
                terminal.print_error(&format!("unknown command '/{}', try /help", command))?;
            }
        }
    }

    if session.transcript.is_empty() {
        return Ok(());
    }

    // Final save
    session.update_name_from_first_question();
    if let Err(e) = store.save(&mut session) {
        terminal.print_error(&format!("Failed to save session: {}", e))?;
    } else {
        terminal.print_info(&format!(
            "Session saved: {} in {}",
            session.id,
            store.dir().display()
        ))?;
    }

    Ok(())
}

/// Run one question through the dispatcher, printing the answer as it grows.
async fn ask(
    terminal: &Terminal,
    dispatcher: &TurnDispatcher,
    client: &RagClient,
    session: &mut Session,
    question: &str,
    cancel: CancellationToken,
    show_sources: bool,
) -> Result<()> {
    let Some(mut turns) =
        dispatcher.send_turn(&mut session.transcript, &session.id, question, cancel.clone())
    else {
        return Ok(());
    };

    terminal.start_answer()?;
    let mut printed = 0;
    let mut failure = None;
    while let Some(item) = turns.next().await {
        match item {
            Ok(snapshot) => {
                if let Some(answer) = snapshot.open_agent_turn() {
                    terminal.print_fragment(&mut printed, answer.text())?;
                }
            }
            Err(e) => failure = Some(e),
        }
    }
    drop(turns);
    terminal.end_answer()?;

    if cancel.is_cancelled() {
        terminal.print_info("[cancelled]")?;
    }
    if let Some(e) = failure {
        error!(error = %e, session = %session.id, "Answer stream failed");
        terminal.print_error(&e.to_string())?;
    }

    if show_sources {
        if let Some(answer) = session.transcript.open_agent_turn() {
            terminal.print_sources(answer, client)?;
        }
    }
    Ok(())
}

async fn upload(terminal: &Terminal, client: &RagClient, paths: &[PathBuf]) -> Result<()> {
    let report = client
        .upload_files(paths)
        .await
        .context("upload failed")?;
    terminal.print_success(&format!(
        "{} ({})",
        report.message,
        report.filenames.join(", ")
    ))?;
    Ok(())
}

async fn ingest(terminal: &Terminal, client: &RagClient) -> Result<()> {
    terminal.print_info("Loading and embedding PDFs, this can take a while...")?;
    let report = client
        .load_and_process_pdfs()
        .await
        .context("ingestion failed")?;
    terminal.print_success(&report.message)?;
    if !report.output.trim().is_empty() {
        terminal.print_info(report.output.trim())?;
    }
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Banter - streaming chat sessions for your terminal
//!
//! Entry point for the Banter CLI. The CLI is a thin shell over the
//! controller: it only calls controller operations and reads store data.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use uuid::Uuid;

use banter::chat::controller::{ChatController, ChatObserver, SendOptions};
use banter::cli::{ChatArgs, Cli, Commands};
use banter::config::Settings;
use banter::error::{BanterError, Result};
use banter::llm::openai::OpenAiProvider;
use banter::session::{FileBackend, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());
    if cli.verbose > 0 {
        let level = match cli.verbose {
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_filter = env_filter.add_directive(
            format!("banter={level}")
                .parse()
                .expect("static directive"),
        );
    }
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(BanterError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Settings::load_from(path)?
        }
        None => Settings::load()?,
    };

    let api_key = settings.resolve_api_key().unwrap_or_default();
    if api_key.is_empty() {
        eprintln!("warning: no API key configured (set api.api_key or $BANTER_API_KEY)");
    }

    let store = SessionStore::open(Box::new(FileBackend::new(settings.sessions_dir())));
    let provider = Arc::new(OpenAiProvider::new(settings.api.base_url.clone(), api_key));
    let mut controller = ChatController::new(store, provider, settings);

    match cli.command {
        Some(Commands::Sessions) => run_sessions(&controller),
        Some(Commands::Export(args)) => {
            print!("{}", controller.export_markdown(Some(args.id))?);
            Ok(())
        }
        Some(Commands::Delete(args)) => {
            if controller.delete_session(args.id)? {
                println!("Deleted session {}", args.id);
            } else {
                println!("No session {}", args.id);
            }
            Ok(())
        }
        Some(Commands::Chat(args)) => run_chat(&mut controller, args).await,
        None => run_chat(&mut controller, ChatArgs::default()).await,
    }
}

fn run_sessions(controller: &ChatController) -> Result<()> {
    let sessions = controller.store().list_sessions();
    if sessions.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }
    let current = controller.store().current_session_id();
    for session in sessions {
        let marker = if current == Some(session.id) { "*" } else { " " };
        println!(
            "{} {}  {}  {} messages  (updated {})",
            marker,
            session.id,
            if session.title.is_empty() {
                "(untitled)"
            } else {
                &session.title
            },
            session.messages.len(),
            session.updated_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

async fn run_chat(controller: &mut ChatController, args: ChatArgs) -> Result<()> {
    if let Some(id) = args.session {
        controller.switch_session(id)?;
    }

    // Ctrl-C cancels the in-flight stream instead of killing the process.
    let control = controller.control();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            control.stop();
        }
    });

    println!("banter — /new starts a session, /regen retries, /quit exits");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                let id = controller.new_session();
                println!("Started session {id}");
                continue;
            }
            "/regen" => {
                let mut observer = StdoutObserver::default();
                match controller.regenerate(None, &mut observer).await {
                    Ok(outcome) => observer.finish(&outcome),
                    Err(e) => eprintln!("error: {e}"),
                }
                continue;
            }
            _ => {}
        }

        let opts = SendOptions {
            reasoning: args.reasoning,
            system_override: args.system.clone(),
        };
        let mut observer = StdoutObserver::default();
        match controller.send(None, input, opts, &mut observer).await {
            Ok(outcome) => observer.finish(&outcome),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

/// Prints deltas as they arrive, with a header when reasoning text appears.
#[derive(Default)]
struct StdoutObserver {
    printed_reasoning: bool,
    printed_content: bool,
}

impl StdoutObserver {
    fn finish(&self, outcome: &banter::chat::controller::SendOutcome) {
        if outcome.cancelled() {
            println!("\n(stopped)");
            return;
        }
        println!();
        if let Some(reply) = &outcome.reply {
            if let Some(usage) = &reply.usage {
                println!("({usage})");
            }
        }
    }
}

impl ChatObserver for StdoutObserver {
    fn on_stream_start(&mut self, _session_id: Uuid) {
        self.printed_reasoning = false;
        self.printed_content = false;
    }

    fn on_content_delta(&mut self, text: &str) {
        if self.printed_reasoning && !self.printed_content {
            println!("\n[answer]");
        }
        self.printed_content = true;
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn on_reasoning_delta(&mut self, text: &str) {
        if !self.printed_reasoning {
            println!("[thinking]");
        }
        self.printed_reasoning = true;
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

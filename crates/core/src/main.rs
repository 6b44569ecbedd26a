use std::io::{self, Write};
use std::time::Duration;

use ballast_core::config::BallastCfg;
use ballast_core::runtime::Service;
use ballast_core::types::ExecutionResult;
use ballast_llm::credentials::EnvCredentials;
use ballast_llm::provider::ChatMessage;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;
const SYSTEM_PROMPT: &str = "You are a concise on-device assistant.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    // DATABASE_URL is optional; without it nothing is persisted.
    let mut startup_notice: Option<String> = None;
    let pool = if let Ok(url) = std::env::var("DATABASE_URL") {
        let mut fallback = |reason: String| {
            startup_notice = Some(format!("note: {reason}, running in ephemeral mode. Nothing is persisted."));
        };
        match tokio::time::timeout(
            Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
            sqlx::postgres::PgPoolOptions::new().max_connections(8).connect(&url),
        )
        .await
        {
            Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "migration failed");
                    fallback("database migration failed".into());
                    None
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "database connect failed");
                fallback("cannot connect to DATABASE_URL".into());
                None
            }
            Err(_) => {
                fallback(format!("database connect timed out ({DB_CONNECT_TIMEOUT_SECS}s)"));
                None
            }
        }
    } else {
        None
    };

    let cfg = match &pool {
        Some(pool) => BallastCfg::load(pool).await?,
        None => BallastCfg::default(),
    };

    let credentials = EnvCredentials::new();
    let service = Service::start(cfg, pool, &credentials);
    let token = service.shutdown_guard().token();
    spawn_sigint_canceler(token.clone());

    let result = run_repl(&service, token, startup_notice).await;
    service.shutdown().await;
    result
}

fn init_tracing() -> anyhow::Result<()> {
    // The REPL owns stdout; logs go to a JSON file when requested, stderr otherwise.
    match std::env::var("BALLAST_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::File::create(path)?;
            tracing_subscriber::registry()
                .with(EnvFilter::from_default_env())
                .with(fmt::layer().json().with_target(true).with_writer(file))
                .init();
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
    Ok(())
}

async fn run_repl(service: &Service, token: CancellationToken, startup_notice: Option<String>) -> anyhow::Result<()> {
    if let Some(notice) = startup_notice {
        println!("{notice}");
    }
    println!("ballast ready. /status for resources, /quit to exit.");

    let session = Uuid::new_v4();
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    request_next_prompt(&ready_tx);

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = line_rx.recv() => line,
        };
        let Some(event) = line else { break };

        let text = match event {
            InputEvent::Line(line) => line.trim().to_owned(),
            InputEvent::Interrupted => {
                token.cancel();
                break;
            }
            InputEvent::Eof => break,
            InputEvent::Error(err) => {
                eprintln!("input error: {err}");
                break;
            }
        };

        match text.as_str() {
            "" => {}
            "/q" | "/exit" | "/quit" => break,
            "/status" => println!("{}", service.status()),
            _ => {
                let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(text)];
                let task = service.conversation(messages, Some(session));
                print!("thinking...");
                io::stdout().flush()?;
                let result = service.engine().execute_with_cancel(task, token.clone()).await;
                print!("\r\x1b[2K");
                match result {
                    ExecutionResult::Success { text, metadata } => {
                        let via = metadata.get("provider").map(String::as_str).unwrap_or("?");
                        println!("[{via}] {text}");
                    }
                    ExecutionResult::Error { message, code } => println!("error ({code}): {message}"),
                    ExecutionResult::Cancelled => break,
                }
            }
        }
        request_next_prompt(&ready_tx);
    }
    drop(ready_tx);
    println!();
    Ok(())
}

fn request_next_prompt(ready_tx: &std::sync::mpsc::Sender<()>) {
    let _ = ready_tx.send(());
}

/// rustyline blocks, so it lives on its own thread and reads one line per
/// prompt request.
fn spawn_input_thread(line_tx: mpsc::UnboundedSender<InputEvent>, ready_rx: std::sync::mpsc::Receiver<()>) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            let event = match editor.readline("> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    InputEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                Err(ReadlineError::Eof) => InputEvent::Eof,
                Err(e) => InputEvent::Error(e.to_string()),
            };
            let last = !matches!(event, InputEvent::Line(_));
            if line_tx.send(event).is_err() || last {
                break;
            }
        }
    });
}

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

fn spawn_sigint_canceler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

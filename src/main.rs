use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use simplelog::{ConfigBuilder, WriteLogger};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use xbot::api::HttpBackend;
use xbot::core::config::{self, CliOverrides, XbotConfig};
use xbot::core::{ChatError, ChatEvent, ChatSessionController, MessageLog, TurnState};

#[derive(Parser)]
#[command(name = "xbot", about = "Terminal chat client with streamed replies")]
struct Args {
    /// Chat server base URL (e.g. http://localhost:5000)
    #[arg(long)]
    base_url: Option<String>,

    /// Session whose history is loaded and extended
    #[arg(long)]
    session_id: Option<String>,
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_log(log: &MessageLog) {
    for message in log {
        let local = message.timestamp.with_timezone(&chrono::Local);
        println!(
            "{} - {}: {}",
            message.sender.label(),
            local.format("%H:%M:%S"),
            message.text
        );
    }
}

/// Renders controller events. Reply snapshots are printed as diffs so the
/// text appears to type itself.
async fn print_events(mut events: mpsc::Receiver<ChatEvent>) {
    let mut shown = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::StateChanged(TurnState::Streaming) => {
                shown = 0;
                print!("Bot: ");
            }
            ChatEvent::Reply(snapshot) => {
                if let Some(new_text) = snapshot.get(shown..) {
                    print!("{new_text}");
                    shown = snapshot.len();
                }
            }
            ChatEvent::ReplyFinished(_) => println!(),
            ChatEvent::Failed(err) => eprintln!("\nerror: {err}"),
            ChatEvent::StateChanged(TurnState::Idle) => prompt(),
            _ => {}
        }
        let _ = std::io::stdout().flush();
    }
}

/// Cancels the active turn, if any. Returns false when idle.
fn cancel_active_turn(active: &watch::Receiver<Option<CancellationToken>>) -> bool {
    let token = active.borrow().clone();
    match token {
        Some(token) => {
            token.cancel();
            true
        }
        None => false,
    }
}

/// One SIGINT listener for the whole session. Ctrl-C cancels the active
/// turn, or exits when idle.
async fn handle_ctrl_c(active: watch::Receiver<Option<CancellationToken>>) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if cancel_active_turn(&active) {
            log::info!("Ctrl-C: cancelled active turn");
        } else {
            log::info!("Ctrl-C at prompt, exiting");
            println!();
            std::process::exit(130);
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let file_config = config::load_config().unwrap_or_else(|e| {
        eprintln!("{e}; using defaults");
        XbotConfig::default()
    });
    let resolved = config::resolve(
        &file_config,
        &CliOverrides {
            base_url: args.base_url.as_deref(),
            session_id: args.session_id.as_deref(),
        },
    );

    // Initialize file logger - terminal output is reserved for the chat
    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();

    if let Ok(log_file) = File::create(&resolved.log_file) {
        let _ = WriteLogger::init(resolved.log_level, log_config, log_file);
    }

    log::info!(
        "xbot starting up against {} (session {})",
        resolved.base_url,
        resolved.session_id
    );

    let (tx, rx) = mpsc::channel(resolved.event_buffer);
    let printer = tokio::spawn(print_events(rx));

    let backend = Arc::new(HttpBackend::from_config(&resolved));
    let mut chat =
        ChatSessionController::new(backend, resolved.session_id.clone()).with_events(tx);

    if chat.load_history().await.is_ok() {
        print_log(chat.messages());
    }
    println!("Type a message and press Enter. Ctrl-C stops a reply, /history reprints, /quit exits.");
    prompt();

    let (active_turn, active_rx) = watch::channel(None);
    tokio::spawn(handle_ctrl_c(active_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/history" => {
                print_log(chat.messages());
                prompt();
                continue;
            }
            _ => {}
        }

        chat.set_draft(line);
        active_turn.send_replace(Some(chat.cancellation()));
        // Other failures were already surfaced through the event channel
        if let Err(ChatError::EmptyInput) = chat.submit().await {
            prompt();
        }
        active_turn.send_replace(None);
    }

    log::info!("xbot shutting down");
    drop(chat);
    let _ = printer.await;
    Ok(())
}

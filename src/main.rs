use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use emma_chat::{
    BackendClient, CaptureDevice, ChatBackend, Config, FileHistoryStore, HttpApi, Message,
    MessageSource, PushChannel, Role, SessionController, SessionOutput, SpoolPlayback,
    UnavailableDevice, WavFileDevice,
};

/// Terminal client for the EMMA receptionist backend.
#[derive(Parser, Debug)]
#[command(name = "emma-chat", version)]
struct Args {
    /// Config file, without extension
    #[arg(long, default_value = "config/emma-chat")]
    config: String,

    /// Override the history file path
    #[arg(long)]
    history: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("{} starting", cfg.service.name);
    info!("Backend API: {}", cfg.backend.base_url);

    let http = HttpApi::new(cfg.backend.base_url.clone(), cfg.request_timeout())?;
    let mut backend = BackendClient::new(http);

    let mut push_rx = None;
    match &cfg.backend.nats_url {
        Some(nats_url) => match PushChannel::connect(nats_url).await {
            Ok((push, rx)) => {
                backend = backend.with_push(push);
                push_rx = Some(rx);
            }
            Err(e) => {
                warn!("Push channel unavailable, using HTTP only: {:#}", e);
            }
        },
        None => {
            info!("No push channel configured; using HTTP only");
        }
    }

    let device: Box<dyn CaptureDevice> = match &cfg.voice.input_wav {
        Some(path) => {
            let expanded = shellexpand::tilde(path).into_owned();
            info!("Voice input: {}", expanded);
            Box::new(WavFileDevice::new(expanded, cfg.session_config().capture))
        }
        None => {
            info!("No voice input configured");
            Box::new(UnavailableDevice)
        }
    };

    let history_path = match &args.history {
        Some(path) => PathBuf::from(shellexpand::tilde(path).into_owned()),
        None => cfg.history_path(),
    };
    info!("History file: {:?}", history_path);
    let store = Box::new(FileHistoryStore::new(history_path));

    let backend: Arc<dyn ChatBackend> = Arc::new(backend);
    let mut controller =
        SessionController::new(cfg.session_config(), Arc::clone(&backend), device, store);

    if let Some(dir) = cfg.playback_dir() {
        info!("Reply audio spool: {:?}", dir);
        controller = controller.with_playback(Arc::new(SpoolPlayback::new(dir)));
    }

    // Bridge push-channel events into the session queue.
    if let Some(mut rx) = push_rx {
        let events = controller.events_sender();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if events.send(event.into()).await.is_err() {
                    break;
                }
            }
        });
    }

    let mut outputs = controller.watch_outputs();
    let mut events = controller
        .take_events()
        .context("Event queue already taken")?;

    let restored = controller.messages();
    if !restored.is_empty() {
        println!("--- restored {} message(s) ---", restored.len());
        for message in &restored {
            print_message(message);
        }
    }
    println!("Type a message to chat, or /help for commands.");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&mut controller, &backend, line.trim(), &mut lines).await? {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(event) = events.recv() => {
                controller.handle_event(event).await;
            }
            Some(output) = outputs.recv() => {
                render_output(output);
            }
        }
    }

    controller.shutdown().await;
    info!("Goodbye");
    Ok(())
}

/// Dispatch one line of input. Returns `false` when the user quits.
async fn handle_line(
    controller: &mut SessionController,
    backend: &Arc<dyn ChatBackend>,
    line: &str,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<bool> {
    if line.is_empty() {
        return Ok(true);
    }

    if !line.starts_with('/') {
        controller.send_typed_message(line).await;
        return Ok(true);
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");

    match command {
        "/quit" | "/exit" => return Ok(false),

        "/help" => print_help(),

        "/voice" => controller.toggle_capture().await,

        "/reset" => {
            print!("This clears the conversation and its saved history. Continue? [y/N] ");
            std::io::stdout().flush().ok();
            match lines.next_line().await? {
                Some(answer) if answer.trim().eq_ignore_ascii_case("y") => {
                    let id = controller.reset_session();
                    println!("Started a new conversation ({})", id);
                }
                _ => println!("Reset cancelled"),
            }
        }

        "/status" => {
            let stats = controller.stats();
            println!("session    {}", stats.session_id);
            println!("uptime     {:.0}s", stats.duration_secs);
            println!("transport  {:?}", stats.transport);
            println!("capture    {:?}", stats.capture);
            println!(
                "messages   {} visible, {} stored, {} in flight",
                stats.visible_messages, stats.stored_messages, stats.turns_in_flight
            );
            for notice in controller.notices() {
                println!("notice     {}", notice.text);
            }
        }

        "/history" => {
            for message in controller.messages() {
                print_message(&message);
            }
        }

        "/dismiss" => controller.dismiss_notices(),

        "/health" => match backend.health().await {
            Ok(report) => {
                println!("backend: {}", report.status);
                for (service, up) in &report.services {
                    println!("  {}: {}", service, if *up { "up" } else { "down" });
                }
            }
            Err(e) => println!("Health check failed: {}", e),
        },

        "/export" => match parts.next() {
            Some(path) => {
                let snapshot = controller.full_history();
                match serde_json::to_vec_pretty(&snapshot) {
                    Ok(data) => match tokio::fs::write(path, data).await {
                        Ok(()) => println!(
                            "Exported {} message(s) to {}",
                            snapshot.messages.len(),
                            path
                        ),
                        Err(e) => println!("Export failed: {}", e),
                    },
                    Err(e) => println!("Export failed: {}", e),
                }
            }
            None => println!("usage: /export <path>"),
        },

        other => println!("Unknown command: {} (try /help)", other),
    }

    Ok(true)
}

fn render_output(output: SessionOutput) {
    match output {
        SessionOutput::Message(message) => print_message(&message),
        SessionOutput::Notice(notice) => println!("! {}", notice.text),
        SessionOutput::Transport(state) => println!("-- transport: {:?} --", state),
        SessionOutput::Capture(state) => println!("-- capture: {:?} --", state),
        SessionOutput::SessionReset { session_id } => {
            println!("-- new session: {} --", session_id)
        }
    }
}

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "emma",
    };
    let tag = match message.source {
        MessageSource::Voice => " (voice)",
        MessageSource::Typed => "",
    };
    println!("{}{}: {}", who, tag, message.content);
}

fn print_help() {
    println!("/voice            start or stop voice capture");
    println!("/reset            start a new conversation (clears saved history)");
    println!("/status           session statistics");
    println!("/history          show the conversation");
    println!("/export <path>    write the full stored history to a file");
    println!("/health           query backend health");
    println!("/dismiss          clear notices");
    println!("/quit             exit");
}

//! `tacsync-peer`: a terminal participant for a room relay

use crate::config::SyncConfig;
use crate::events::{CoordinatorEvent, MutationEvent, Origin};
use crate::session::{LocalIntent, Session};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io;
use std::time::Duration;
use tacsync_network::{TransportConfig, WsConnector};
use tacsync_state::{LogEntry, Position};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Tacsync peer - play a synchronized session from the terminal")]
struct Args {
    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:3000")]
    relay: String,

    /// Display name announced to the relay
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Create a room with this name and host it
    #[arg(long, conflicts_with = "join")]
    create: Option<String>,

    /// Join an existing room by id
    #[arg(long)]
    join: Option<String>,

    /// Room capacity when creating
    #[arg(long, default_value = "2")]
    capacity: u8,

    /// Host sync tick in milliseconds
    #[arg(long, default_value = "100")]
    sync_interval_ms: u64,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    max_reconnect_attempts: u32,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

pub async fn run() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level {
        LogLevel::Trace => tracing::Level::TRACE,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Error => tracing::Level::ERROR,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .init();

    let config = SyncConfig {
        display_name: args.name.clone(),
        sync_interval: Duration::from_millis(args.sync_interval_ms),
        ..Default::default()
    };
    let transport_config = TransportConfig {
        max_reconnect_attempts: args.max_reconnect_attempts,
        ..Default::default()
    };

    let (intent_tx, intent_rx) = mpsc::channel(32);
    let mut session = Session::connect(
        WsConnector,
        &args.relay,
        config,
        transport_config,
        intent_rx,
    )
    .await
    .with_context(|| format!("Failed to connect to relay at {}", args.relay))?;

    info!(
        "Connected as {}",
        session.coordinator().local_id().unwrap_or("<unassigned>")
    );

    if let Some(room) = &args.create {
        session
            .coordinator_mut()
            .create_room(room, args.capacity)
            .context("Failed to request room creation")?;
    } else if let Some(room_id) = &args.join {
        session
            .coordinator_mut()
            .join_room(room_id)
            .context("Failed to request room join")?;
    }

    tokio::spawn(report_events(session.subscribe()));
    tokio::spawn(read_commands(intent_tx));

    let coordinator = session.run().await;
    info!(
        "Session ended on turn {:?} with {} characters",
        coordinator.state().game.turn,
        coordinator.state().characters.len()
    );
    Ok(())
}

async fn report_events(mut events: broadcast::Receiver<CoordinatorEvent>) {
    loop {
        match events.recv().await {
            Ok(CoordinatorEvent::Mutation(tagged)) => {
                let source = match tagged.origin {
                    Origin::Local => "local".to_string(),
                    Origin::Network { player } => {
                        format!("network:{}", player.as_deref().unwrap_or("host"))
                    }
                };
                info!("[{}] {:?}", source, tagged.event);
            }
            Ok(CoordinatorEvent::RemoteError { code, message }) => {
                warn!("Relay refused: {} {}", code.as_str(), message);
            }
            Ok(CoordinatorEvent::IntentRejected { reason }) => warn!("{}", reason),
            Ok(other) => info!("{:?}", other),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Event reporter lagged, {} events skipped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn read_commands(intents: mpsc::Sender<LocalIntent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match parse_command(&line) {
            Ok(Some(intent)) => {
                let quit = intent == LocalIntent::Quit;
                if intents.send(intent).await.is_err() || quit {
                    return;
                }
            }
            Ok(None) => {}
            Err(usage) => warn!("{}", usage),
        }
    }

    let _ = intents.send(LocalIntent::Quit).await;
}

/// Parse one line of player input
pub fn parse_command(line: &str) -> Result<Option<LocalIntent>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let intent = match command {
        "move" => {
            let (Some(name), Some(x), Some(y)) = (words.next(), words.next(), words.next()) else {
                return Err("usage: move <character> <x> <y>".to_string());
            };
            let x = x.parse().map_err(|_| format!("bad x coordinate {x:?}"))?;
            let y = y.parse().map_err(|_| format!("bad y coordinate {y:?}"))?;
            LocalIntent::Mutation(MutationEvent::CharacterPosition {
                name: name.to_string(),
                position: Position::new(x, y),
            })
        }
        "end" => LocalIntent::EndTurn,
        "ready" => LocalIntent::SetReady(true),
        "unready" => LocalIntent::SetReady(false),
        "say" => {
            let text = words.collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return Err("usage: say <text>".to_string());
            }
            LocalIntent::Mutation(MutationEvent::MessageLogged {
                entry: LogEntry::narrative(text),
            })
        }
        "create" => {
            let Some(name) = words.next() else {
                return Err("usage: create <name> [capacity]".to_string());
            };
            let capacity = match words.next() {
                Some(n) => n.parse().map_err(|_| format!("bad capacity {n:?}"))?,
                None => 2,
            };
            LocalIntent::CreateRoom {
                name: name.to_string(),
                capacity,
            }
        }
        "join" => match words.next() {
            Some(id) => LocalIntent::JoinRoom(id.to_string()),
            None => return Err("usage: join <room-id>".to_string()),
        },
        "leave" => LocalIntent::LeaveRoom,
        "list" => LocalIntent::RequestRoomList,
        "quit" | "exit" => LocalIntent::Quit,
        other => return Err(format!("unknown command {other:?}")),
    };

    Ok(Some(intent))
}

//! Nexus voice core.
//!
//! Realtime voice-control backend for the Nexus assistant UI. Communicates
//! with the host UI via JSON-line IPC on stdin/stdout; owns the realtime
//! audio session, tool-call dispatch, and the offline command cache. This is
//! the entry point that initializes logging and config and runs the main
//! command loop.

mod audio;
mod cache;
mod config;
mod ipc;
mod live;
mod session;
mod tools;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cache::{CommandCache, FileStore};
use config::read_voice_config;
use ipc::bridge::{emit_event, spawn_stdin_reader};
use ipc::{UiCommand, UiEvent};
use session::{SessionControl, SessionHandle};

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info). Logs go
    // to stderr; stdout carries IPC events.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    emit_event(&UiEvent::Starting {});

    let voice_config = read_voice_config();
    info!(
        endpoint = %voice_config.endpoint,
        model = %voice_config.model,
        voice = %voice_config.voice_name,
        "Configuration loaded"
    );

    // Spawn stdin reader (blocking thread -> async channel).
    let mut cmd_rx = spawn_stdin_reader();

    // Session events funnel through one channel onto stdout.
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<UiEvent>();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            emit_event(&event);
        }
    });

    emit_event(&UiEvent::Ready {});
    info!("Voice core ready");

    let mut voice: Option<SessionHandle> = None;

    // Main loop: process commands from the host UI.
    loop {
        match cmd_rx.recv().await {
            Some(UiCommand::StartVoice {}) => {
                // Only one session at a time; a new start replaces the old.
                if let Some(old) = voice.take() {
                    old.send(SessionControl::Close);
                }
                info!("Starting voice session");
                let command_cache = CommandCache::load(Box::new(FileStore::in_data_dir()));
                voice = Some(session::spawn(
                    voice_config.clone(),
                    command_cache,
                    event_tx.clone(),
                ));
            }

            Some(UiCommand::StopVoice {}) => {
                if let Some(handle) = voice.take() {
                    handle.send(SessionControl::Close);
                }
            }

            Some(UiCommand::Connectivity { online }) => {
                if let Some(handle) = &voice {
                    handle.send(SessionControl::Connectivity { online });
                }
            }

            Some(UiCommand::RunCached { id }) => {
                if let Some(handle) = &voice {
                    handle.send(SessionControl::RunCached { id });
                }
            }

            Some(UiCommand::Ping {}) => {
                emit_event(&UiEvent::Pong {});
            }

            Some(UiCommand::Stop {}) => {
                emit_event(&UiEvent::Stopping {});
                if let Some(handle) = voice.take() {
                    handle.send(SessionControl::Close);
                }
                break;
            }

            None => {
                // stdin closed — host process gone.
                info!("stdin closed, shutting down");
                break;
            }
        }
    }

    info!("Voice core shutting down");
}

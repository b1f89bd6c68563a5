//! IPC protocol types for communication with the host UI.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::cache::CachedCommand;
use crate::session::SessionState;
use crate::tools::Section;

/// All events emitted to the host UI via stdout as JSON lines.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum UiEvent {
    Starting {},
    Ready {},
    /// Current session state; the UI drives its overlay styling off this.
    SessionState { state: SessionState },
    /// Latest recognized user speech. Replaces the previous value.
    Transcript { text: String },
    /// RMS amplitude of the latest capture frame, for the waveform visual.
    Volume { level: f32 },
    /// Voice command asked to switch the active app section.
    Navigate { section: Section },
    /// Voice command asked to open the authentication flow.
    Authenticate {},
    /// Cached commands to display while offline, newest first.
    CachedCommands { commands: Vec<CachedCommand> },
    Error { message: String },
    Pong {},
    Stopping {},
}

/// All commands received from the host UI via stdin as JSON lines.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum UiCommand {
    /// Open the voice overlay: start a realtime session.
    StartVoice {},
    /// User closed the overlay.
    StopVoice {},
    /// Host-side connectivity changed (the UI watches the network, we
    /// don't probe).
    Connectivity { online: bool },
    /// Replay a cached command while offline.
    RunCached { id: String },
    Ping {},
    Stop {},
}

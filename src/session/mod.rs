//! Voice session manager.
//!
//! Owns the lifecycle of one realtime voice interaction: microphone capture,
//! outbound frame streaming, gapless inbound playback, transcription,
//! tool-call execution, barge-in, offline fallback to the command cache, and
//! teardown. The five states and their triggers live in one explicit enum
//! driven by a single `tokio::select!` loop; capture callbacks, network
//! messages, and timers all arrive as channel events, so ordering between
//! event kinds is handled in one place.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::capture::{spawn_frame_pump, start_capture, CaptureHandle};
use crate::audio::pcm::{self, OUTPUT_SAMPLE_RATE};
use crate::audio::playback::{AudioPlayer, MonotonicClock, OutputClock, PlaybackQueue};
use crate::audio::ring_buffer::frame_ring_buffer;
use crate::cache::{CommandCache, DEFAULT_COMMAND_TEXT};
use crate::config::VoiceConfig;
use crate::ipc::UiEvent;
use crate::live::client::{self, LiveSender};
use crate::live::{ServerEvent, ToolCall, ToolResponse};
use crate::tools::{self, ToolInvocation, UiEffect};

/// Quiet period after the last tool call before returning to Listening.
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Delay between a `close_voice_control` acknowledgement and teardown, so a
/// final spoken confirmation can finish.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Listening,
    Thinking,
    Executing,
    Offline,
    Closed,
}

/// Control messages from the host UI, forwarded by the main loop.
#[derive(Debug)]
pub enum SessionControl {
    Close,
    Connectivity { online: bool },
    RunCached { id: String },
}

/// Timer and playback-completion events the session sends itself.
#[derive(Debug)]
enum Internal {
    PlaybackDone(u64),
    Settled(u64),
    CloseGrace,
}

/// Handle held by the main loop while a session task is running.
pub struct SessionHandle {
    control: mpsc::UnboundedSender<SessionControl>,
}

impl SessionHandle {
    pub fn send(&self, control: SessionControl) {
        let _ = self.control.send(control);
    }
}

pub struct Session {
    state: SessionState,
    online: bool,
    queue: PlaybackQueue,
    clock: Box<dyn OutputClock>,
    player: Option<AudioPlayer>,
    capture: Option<CaptureHandle>,
    sender: Option<LiveSender>,
    cache: CommandCache,
    transcript: String,
    settle_gen: u64,
    config: VoiceConfig,
    events: mpsc::UnboundedSender<UiEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

/// Spawn a session task. It drives itself until closed; the handle only
/// feeds it control messages.
pub fn spawn(
    config: VoiceConfig,
    cache: CommandCache,
    events: mpsc::UnboundedSender<UiEvent>,
) -> SessionHandle {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let session = Session::new(config, cache, events, internal_tx);
    tokio::spawn(session.run(control_rx, internal_rx));
    SessionHandle {
        control: control_tx,
    }
}

impl Session {
    fn new(
        config: VoiceConfig,
        cache: CommandCache,
        events: mpsc::UnboundedSender<UiEvent>,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> Self {
        Self {
            state: SessionState::Connecting,
            online: false,
            queue: PlaybackQueue::new(),
            clock: Box::new(MonotonicClock::new()),
            player: None,
            capture: None,
            sender: None,
            cache,
            transcript: String::new(),
            settle_gen: 0,
            config,
            events,
            internal_tx,
        }
    }

    async fn run(
        mut self,
        mut control_rx: mpsc::UnboundedReceiver<SessionControl>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
    ) {
        // The session starts in Connecting; announce it before the
        // handshake so the UI shows the right overlay immediately.
        self.emit(UiEvent::SessionState { state: self.state });
        let (mut server_rx, mut frame_rx) = self.establish().await;

        loop {
            tokio::select! {
                Some(control) = control_rx.recv() => {
                    match control {
                        SessionControl::Close => break,
                        SessionControl::Connectivity { online: false } => {
                            if self.online {
                                info!("Connectivity lost");
                                self.go_offline();
                            }
                        }
                        SessionControl::Connectivity { online: true } => {
                            if self.state == SessionState::Offline {
                                info!("Connectivity restored, reconnecting");
                                (server_rx, frame_rx) = self.establish().await;
                            }
                        }
                        SessionControl::RunCached { id } => self.run_cached(&id),
                    }
                }
                Some(event) = server_rx.recv(), if self.online => {
                    self.handle_server_event(event);
                }
                Some(frame) = frame_rx.recv(), if self.online => {
                    self.handle_frame(&frame);
                }
                Some(internal) = internal_rx.recv() => {
                    if !self.handle_internal(internal) {
                        break;
                    }
                }
                else => break,
            }
        }

        self.teardown();
    }

    /// Connect to the backend and open the audio devices. Any failure lands
    /// in Offline (not Closed) so cached commands stay usable.
    async fn establish(
        &mut self,
    ) -> (
        mpsc::UnboundedReceiver<ServerEvent>,
        mpsc::UnboundedReceiver<Vec<f32>>,
    ) {
        self.set_state(SessionState::Connecting);

        let (sender, server_rx) = match client::connect(&self.config).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Backend handshake failed: {e:#}");
                self.go_offline();
                return (dead_channel(), dead_channel());
            }
        };

        let frame_rx = match self.open_audio() {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Audio device unavailable: {e:#}");
                self.go_offline();
                return (dead_channel(), dead_channel());
            }
        };

        self.sender = Some(sender);
        self.online = true;
        self.set_state(SessionState::Listening);
        (server_rx, frame_rx)
    }

    fn open_audio(&mut self) -> anyhow::Result<mpsc::UnboundedReceiver<Vec<f32>>> {
        let player = AudioPlayer::open(self.config.playback_volume)?;
        let (producer, consumer) = frame_ring_buffer(None);
        let capture = start_capture(producer, self.config.input_device.clone())?;
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_frame_pump(consumer, tx);
        self.player = Some(player);
        self.capture = Some(capture);
        Ok(rx)
    }

    /// One capture frame: meter it for the UI, encode, fire-and-forget.
    fn handle_frame(&mut self, frame: &[f32]) {
        self.emit(UiEvent::Volume {
            level: pcm::rms(frame),
        });
        if let Some(sender) = &self.sender {
            sender.send_realtime(&pcm::encode_frame(frame));
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::AudioFragment(payload) => {
                let buffer = match pcm::decode_frame(&payload)
                    .and_then(|bytes| pcm::decode_to_audio_buffer(&bytes, OUTPUT_SAMPLE_RATE, 1))
                {
                    Ok(buf) => buf,
                    Err(e) => {
                        // A bad fragment never terminates the session.
                        warn!("Dropping undecodable audio fragment: {e}");
                        return;
                    }
                };
                if self.state == SessionState::Listening {
                    self.set_state(SessionState::Thinking);
                }
                self.schedule_fragment(buffer);
            }
            ServerEvent::Transcription(text) => {
                self.transcript = text.clone();
                self.emit(UiEvent::Transcript { text });
            }
            ServerEvent::ToolCalls(calls) => self.handle_tool_calls(calls),
            ServerEvent::Interrupted => {
                let stopped = self.queue.interrupt(self.clock.now());
                if let Some(player) = &self.player {
                    player.stop();
                }
                debug!(stopped, "Barge-in, playback cancelled");
                self.set_state(SessionState::Listening);
            }
            ServerEvent::TurnComplete => debug!("Turn complete"),
            ServerEvent::Closed => {
                warn!("Backend closed the session");
                self.go_offline();
            }
            ServerEvent::ConnectionError(e) => {
                warn!("Realtime connection error: {e}");
                self.go_offline();
            }
        }
    }

    /// Assign a gapless start time, hand the samples to the output device,
    /// and arm a completion timer for the Thinking -> Listening transition.
    fn schedule_fragment(&mut self, buffer: pcm::AudioBuffer) {
        let now = self.clock.now();
        let scheduled = self.queue.schedule(buffer.duration(), now);
        if let Some(player) = &self.player {
            player.append(buffer.samples, buffer.sample_rate);
        }
        let remaining = (scheduled.start + scheduled.duration - now).max(0.0);
        let tx = self.internal_tx.clone();
        let id = scheduled.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(remaining)).await;
            let _ = tx.send(Internal::PlaybackDone(id));
        });
    }

    /// Dispatch each call in order, acknowledge every recognized name, and
    /// seed the offline cache from the live path.
    fn handle_tool_calls(&mut self, calls: Vec<ToolCall>) {
        self.set_state(SessionState::Executing);
        let mut close_requested = false;

        for call in calls {
            let Some(invocation) = ToolInvocation::parse(&call.name, &call.args) else {
                warn!(name = %call.name, "Ignoring unknown tool call");
                continue;
            };
            info!(name = %call.name, args = %call.args, "Executing voice command");

            let outcome = tools::dispatch(&invocation);
            self.apply_effect(outcome.effect);
            close_requested |= outcome.close_session;

            if let Some(sender) = &self.sender {
                sender.send_tool_response(&ToolResponse::ok(&call));
            }

            let text = if self.transcript.is_empty() {
                DEFAULT_COMMAND_TEXT.to_string()
            } else {
                self.transcript.clone()
            };
            self.cache.record(
                &text,
                Some(invocation.name().to_string()),
                invocation.cache_args(),
            );
        }

        if close_requested {
            self.arm_close_grace();
        }
        self.arm_settle_timer();
    }

    fn apply_effect(&self, effect: Option<UiEffect>) {
        match effect {
            Some(UiEffect::Navigate(section)) => self.emit(UiEvent::Navigate { section }),
            Some(UiEffect::Authenticate) => self.emit(UiEvent::Authenticate {}),
            None => {}
        }
    }

    /// Replay a cached command without a backend: mirrors a live tool call
    /// visually, then settles back to Offline.
    fn run_cached(&mut self, id: &str) {
        if self.state != SessionState::Offline {
            return;
        }
        let Some(command) = self.cache.get(id).cloned() else {
            warn!(id, "No such cached command");
            return;
        };
        let Some(action) = command.action.as_deref() else {
            return;
        };
        let args = command.args.clone().unwrap_or(serde_json::Value::Null);
        let Some(invocation) = ToolInvocation::parse(action, &args) else {
            warn!(action, "Cached command no longer recognized");
            return;
        };

        info!(action, "Replaying cached command offline");
        self.set_state(SessionState::Executing);
        self.emit(UiEvent::Transcript {
            text: command.text.clone(),
        });

        let outcome = tools::dispatch(&invocation);
        self.apply_effect(outcome.effect);
        if outcome.close_session {
            self.arm_close_grace();
        }
        self.arm_settle_timer();
    }

    fn arm_settle_timer(&mut self) {
        self.settle_gen += 1;
        let generation = self.settle_gen;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SETTLE_DELAY).await;
            let _ = tx.send(Internal::Settled(generation));
        });
    }

    fn arm_close_grace(&self) {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CLOSE_GRACE).await;
            let _ = tx.send(Internal::CloseGrace);
        });
    }

    /// Returns `false` when the session should tear down.
    fn handle_internal(&mut self, event: Internal) -> bool {
        match event {
            Internal::PlaybackDone(id) => {
                if self.queue.finish(id) && self.state == SessionState::Thinking {
                    self.set_state(SessionState::Listening);
                }
            }
            Internal::Settled(generation) => {
                // Stale timers from an earlier burst of tool activity are
                // ignored; only the latest one ends Executing.
                if generation == self.settle_gen && self.state == SessionState::Executing {
                    let next = if self.online {
                        SessionState::Listening
                    } else {
                        SessionState::Offline
                    };
                    self.set_state(next);
                }
            }
            Internal::CloseGrace => return false,
        }
        true
    }

    /// Device, handshake, and connection failures all land here: release
    /// every audio resource and surface the cached commands.
    fn go_offline(&mut self) {
        self.release_audio();
        self.sender = None;
        self.online = false;
        if !self.queue.is_idle() {
            debug!("Discarding scheduled playback");
        }
        self.queue.interrupt(self.clock.now());
        self.set_state(SessionState::Offline);
        self.emit(UiEvent::CachedCommands {
            commands: self.cache.entries().to_vec(),
        });
    }

    fn release_audio(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(player) = self.player.take() {
            player.stop();
        }
    }

    /// Runs on every exit path, whatever state was active.
    fn teardown(&mut self) {
        self.release_audio();
        self.sender = None; // dropping the sender closes the socket
        self.online = false;
        self.set_state(SessionState::Closed);
        info!("Voice session closed");
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(?state, "Session state change");
            self.state = state;
            self.emit(UiEvent::SessionState { state });
        }
    }

    fn emit(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }
}

/// A receiver whose sender is already gone. Its select arms stay disabled
/// behind the `online` guard while the session is offline.
fn dead_channel<T>() -> mpsc::UnboundedReceiver<T> {
    let (_tx, rx) = mpsc::unbounded_channel();
    rx
}

//! WebSocket connection to the realtime backend.
//!
//! After the handshake the setup message (tool declarations, voice, audio
//! modality) goes out first, then the connection splits into a writer task
//! fed by an unbounded channel (fire-and-forget, single source, so outbound
//! ordering is capture ordering) and a reader task that parses inbound
//! messages into [`ServerEvent`]s for the session.

use anyhow::anyhow;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::audio::pcm::EncodedFrame;
use crate::config::VoiceConfig;

use super::{
    parse_server_message, realtime_input_message, setup_message, tool_response_message,
    ServerEvent, ToolResponse,
};

/// Outbound half of a live connection. Dropping it closes the socket.
pub struct LiveSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl LiveSender {
    /// Send one microphone frame. No acknowledgement is awaited and there
    /// is no backpressure; a dead connection surfaces via the event stream.
    pub fn send_realtime(&self, frame: &EncodedFrame) {
        self.send_json(realtime_input_message(frame));
    }

    pub fn send_tool_response(&self, response: &ToolResponse) {
        self.send_json(tool_response_message(response));
    }

    fn send_json(&self, value: serde_json::Value) {
        let _ = self.tx.send(Message::Text(value.to_string()));
    }
}

/// Open a realtime session: connect, send setup, spawn the reader and
/// writer tasks.
pub async fn connect(
    config: &VoiceConfig,
) -> anyhow::Result<(LiveSender, mpsc::UnboundedReceiver<ServerEvent>)> {
    let api_key = config
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow!("no API key configured"))?;
    let url = format!("{}?key={}", config.endpoint, api_key);

    let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
    debug!("Realtime socket connected");

    let (mut sink, mut stream) = ws.split();
    sink.send(Message::Text(setup_message(config).to_string()))
        .await?;

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
        debug!("Realtime writer closed");
    });

    let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            let text = match item {
                Ok(Message::Text(text)) => text,
                // Some backends frame JSON as binary.
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("Dropping non-UTF8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    let _ = event_tx.send(ServerEvent::Closed);
                    return;
                }
                Ok(_) => continue,
                Err(e) => {
                    let _ = event_tx.send(ServerEvent::ConnectionError(e.to_string()));
                    return;
                }
            };
            for event in parse_server_message(&text) {
                if event_tx.send(event).is_err() {
                    return; // session gone
                }
            }
        }
        let _ = event_tx.send(ServerEvent::Closed);
    });

    Ok((LiveSender { tx: out_tx }, event_rx))
}

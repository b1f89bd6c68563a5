//! Realtime wire protocol for the generative backend.
//!
//! Outbound messages carry base64 PCM microphone frames and tool responses;
//! inbound messages are parsed into [`ServerEvent`]s. A single inbound
//! message may carry several events (a tool call and an audio fragment can
//! arrive together, in either order) so parsing returns a list.

pub mod client;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audio::pcm::EncodedFrame;
use crate::config::VoiceConfig;
use crate::tools;

/// Status text returned for every acknowledged tool call.
pub const TOOL_RESULT_OK: &str = "Action completed successfully";

/// Persona for the voice assistant.
const SYSTEM_INSTRUCTION: &str = "You are the Nexus VIP Voice OS. You have direct control over \
the app's navigation and security modules. Keep responses brief and sophisticated. When \
executing a tool, inform the user with a short confirmation.";

/// A backend-issued request to perform a named local action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Acknowledgement returned for a recognized tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub response: ToolResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub result: String,
}

impl ToolResponse {
    pub fn ok(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: ToolResult {
                result: TOOL_RESULT_OK.to_string(),
            },
        }
    }
}

/// Everything the backend can tell us, decoupled from the wire shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Base64-encoded 16-bit PCM fragment at the output sample rate.
    AudioFragment(String),
    /// Replaces (never appends to) the displayed transcript.
    Transcription(String),
    ToolCalls(Vec<ToolCall>),
    /// Barge-in: stop all scheduled output immediately.
    Interrupted,
    TurnComplete,
    /// Socket closed by the backend.
    Closed,
    ConnectionError(String),
}

// Inbound wire shapes. Only the fields we consume are modeled.

#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(rename = "toolCall")]
    tool_call: Option<ToolCallPayload>,
    #[serde(rename = "serverContent")]
    server_content: Option<ServerContent>,
}

#[derive(Debug, Deserialize)]
struct ToolCallPayload {
    #[serde(rename = "functionCalls", default)]
    function_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ServerContent {
    #[serde(rename = "modelTurn")]
    model_turn: Option<ModelTurn>,
    #[serde(rename = "inputTranscription")]
    input_transcription: Option<Transcription>,
    #[serde(default)]
    interrupted: bool,
    #[serde(rename = "turnComplete", default)]
    turn_complete: bool,
}

#[derive(Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

/// Parse one inbound text message into zero or more events. Unparseable
/// messages yield nothing; the session logs and moves on.
pub fn parse_server_message(text: &str) -> Vec<ServerEvent> {
    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => return Vec::new(),
    };

    let mut events = Vec::new();

    if let Some(tc) = msg.tool_call {
        if !tc.function_calls.is_empty() {
            events.push(ServerEvent::ToolCalls(tc.function_calls));
        }
    }

    if let Some(content) = msg.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    events.push(ServerEvent::AudioFragment(inline.data));
                }
            }
        }
        if let Some(t) = content.input_transcription {
            events.push(ServerEvent::Transcription(t.text));
        }
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    events
}

#[derive(Debug, Deserialize, Default)]
struct Transcription {
    #[serde(default)]
    text: String,
}

/// Setup message sent once at session open: model, audio response modality,
/// voice, static tool declarations, input transcription.
pub fn setup_message(config: &VoiceConfig) -> serde_json::Value {
    json!({
        "setup": {
            "model": config.model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": config.voice_name } }
                }
            },
            "systemInstruction": SYSTEM_INSTRUCTION,
            "tools": [{ "functionDeclarations": tools::declarations() }],
            "inputAudioTranscription": {}
        }
    })
}

/// Wrap an encoded microphone frame as a realtime input message.
pub fn realtime_input_message(frame: &EncodedFrame) -> serde_json::Value {
    json!({ "media": frame })
}

/// Wrap a tool acknowledgement.
pub fn tool_response_message(response: &ToolResponse) -> serde_json::Value {
    json!({ "toolResponse": { "functionResponses": [response] } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::encode_frame;

    #[test]
    fn test_parse_audio_fragment() {
        let events = parse_server_message(
            r#"{"serverContent": {"modelTurn": {"parts": [{"inlineData": {"data": "AAAA"}}]}}}"#,
        );
        assert_eq!(events, vec![ServerEvent::AudioFragment("AAAA".into())]);
    }

    #[test]
    fn test_parse_tool_call() {
        let events = parse_server_message(
            r#"{"toolCall": {"functionCalls": [{"id": "c1", "name": "navigate_to", "args": {"destination": "chat"}}]}}"#,
        );
        match &events[0] {
            ServerEvent::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "navigate_to");
                assert_eq!(calls[0].args["destination"], "chat");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_parse_transcription_and_interrupt() {
        let events = parse_server_message(
            r#"{"serverContent": {"inputTranscription": {"text": "open chat"}, "interrupted": true}}"#,
        );
        assert_eq!(
            events,
            vec![
                ServerEvent::Transcription("open chat".into()),
                ServerEvent::Interrupted
            ]
        );
    }

    #[test]
    fn test_parse_combined_message_keeps_tool_calls_first() {
        let events = parse_server_message(
            r#"{
                "toolCall": {"functionCalls": [{"id": "c2", "name": "authenticate_user", "args": {}}]},
                "serverContent": {"modelTurn": {"parts": [{"inlineData": {"data": "BBBB"}}]}}
            }"#,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ServerEvent::ToolCalls(_)));
        assert_eq!(events[1], ServerEvent::AudioFragment("BBBB".into()));
    }

    #[test]
    fn test_parse_garbage_yields_nothing() {
        assert!(parse_server_message("not json").is_empty());
        assert!(parse_server_message("{}").is_empty());
    }

    #[test]
    fn test_realtime_input_wire_shape() {
        let frame = encode_frame(&[0.0, 0.1]);
        let msg = realtime_input_message(&frame);
        assert_eq!(msg["media"]["mimeType"], "audio/pcm;rate=16000");
        assert!(msg["media"]["data"].is_string());
    }

    #[test]
    fn test_tool_response_wire_shape() {
        let call = ToolCall {
            id: "c3".into(),
            name: "navigate_to".into(),
            args: serde_json::Value::Null,
        };
        let msg = tool_response_message(&ToolResponse::ok(&call));
        let resp = &msg["toolResponse"]["functionResponses"][0];
        assert_eq!(resp["id"], "c3");
        assert_eq!(resp["name"], "navigate_to");
        assert_eq!(resp["response"]["result"], TOOL_RESULT_OK);
    }

    #[test]
    fn test_setup_message_declares_tools() {
        let msg = setup_message(&VoiceConfig::default());
        let decls = &msg["setup"]["tools"][0]["functionDeclarations"];
        assert_eq!(decls.as_array().unwrap().len(), 3);
        assert_eq!(msg["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
    }
}

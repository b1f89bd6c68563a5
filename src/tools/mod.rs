//! Voice tool invocations.
//!
//! The backend can invoke exactly three named actions. They are modeled as a
//! closed sum type, validated once when the wire message is parsed; the
//! dispatcher itself is pure and returns the UI effect plus whether session
//! teardown should follow. Invalid arguments are a soft no-op — the call is
//! still acknowledged as received so the conversational flow never stutters.

use serde::{Deserialize, Serialize};
use serde_json::json;

pub const TOOL_AUTHENTICATE_USER: &str = "authenticate_user";
pub const TOOL_NAVIGATE_TO: &str = "navigate_to";
pub const TOOL_CLOSE_VOICE_CONTROL: &str = "close_voice_control";

/// Main app sections the voice assistant can navigate between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Chat,
    Functions,
    Profile,
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    AuthenticateUser,
    /// `destination` is `None` when the argument was missing or not one of
    /// the known sections; dispatch then performs no section change.
    NavigateTo { destination: Option<Section> },
    CloseVoiceControl,
}

impl ToolInvocation {
    /// Parse a wire tool call. Unknown names yield `None`; the caller logs
    /// and ignores them without acknowledging.
    pub fn parse(name: &str, args: &serde_json::Value) -> Option<Self> {
        match name {
            TOOL_AUTHENTICATE_USER => Some(Self::AuthenticateUser),
            TOOL_NAVIGATE_TO => {
                let destination = args
                    .get("destination")
                    .and_then(|v| serde_json::from_value::<Section>(v.clone()).ok());
                Some(Self::NavigateTo { destination })
            }
            TOOL_CLOSE_VOICE_CONTROL => Some(Self::CloseVoiceControl),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticateUser => TOOL_AUTHENTICATE_USER,
            Self::NavigateTo { .. } => TOOL_NAVIGATE_TO,
            Self::CloseVoiceControl => TOOL_CLOSE_VOICE_CONTROL,
        }
    }

    /// Canonical argument shape for the command cache, so the cache can
    /// dedupe by effect.
    pub fn cache_args(&self) -> Option<serde_json::Value> {
        match self {
            Self::NavigateTo {
                destination: Some(section),
            } => Some(json!({ "destination": section })),
            _ => None,
        }
    }
}

/// State change requested of the host UI by a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEffect {
    Navigate(Section),
    Authenticate,
}

/// Result of dispatching one recognized invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub effect: Option<UiEffect>,
    /// Session teardown should be scheduled after the close grace delay.
    pub close_session: bool,
}

/// Map a recognized invocation to its local effect. Every recognized call
/// succeeds; a missing destination simply produces no effect.
pub fn dispatch(invocation: &ToolInvocation) -> DispatchOutcome {
    match invocation {
        ToolInvocation::AuthenticateUser => DispatchOutcome {
            effect: Some(UiEffect::Authenticate),
            close_session: false,
        },
        ToolInvocation::NavigateTo { destination } => DispatchOutcome {
            effect: destination.map(UiEffect::Navigate),
            close_session: false,
        },
        ToolInvocation::CloseVoiceControl => DispatchOutcome {
            effect: None,
            close_session: true,
        },
    }
}

/// Static tool declarations sent once at session open.
pub fn declarations() -> serde_json::Value {
    json!([
        {
            "name": TOOL_AUTHENTICATE_USER,
            "description": "Trigger the biometric face recognition scanner to unlock the system.",
            "parameters": { "type": "OBJECT", "properties": {} }
        },
        {
            "name": TOOL_NAVIGATE_TO,
            "description": "Switch between the main app sections: chat, functions, or profile.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "destination": { "type": "STRING", "enum": ["chat", "functions", "profile"] }
                },
                "required": ["destination"]
            }
        },
        {
            "name": TOOL_CLOSE_VOICE_CONTROL,
            "description": "Exit the voice interaction mode and return to the main interface.",
            "parameters": { "type": "OBJECT", "properties": {} }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_unknown_name_is_none() {
        assert_eq!(ToolInvocation::parse("self_destruct", &json!({})), None);
    }

    #[test]
    fn test_parse_navigate_valid_destination() {
        let inv = ToolInvocation::parse("navigate_to", &json!({"destination": "profile"})).unwrap();
        assert_eq!(
            inv,
            ToolInvocation::NavigateTo {
                destination: Some(Section::Profile)
            }
        );
    }

    #[test]
    fn test_parse_navigate_invalid_destination_soft_fails() {
        let inv = ToolInvocation::parse("navigate_to", &json!({"destination": "garage"})).unwrap();
        assert_eq!(inv, ToolInvocation::NavigateTo { destination: None });
        let inv = ToolInvocation::parse("navigate_to", &json!({})).unwrap();
        assert_eq!(inv, ToolInvocation::NavigateTo { destination: None });
    }

    #[test]
    fn test_dispatch_navigate_changes_section() {
        let out = dispatch(&ToolInvocation::NavigateTo {
            destination: Some(Section::Profile),
        });
        assert_eq!(out.effect, Some(UiEffect::Navigate(Section::Profile)));
        assert!(!out.close_session);
    }

    #[test]
    fn test_dispatch_navigate_without_destination_is_noop() {
        let out = dispatch(&ToolInvocation::NavigateTo { destination: None });
        assert_eq!(out.effect, None);
        assert!(!out.close_session);
    }

    #[test]
    fn test_dispatch_close_schedules_teardown() {
        let out = dispatch(&ToolInvocation::CloseVoiceControl);
        assert!(out.close_session);
    }

    #[test]
    fn test_declarations_cover_all_three_tools() {
        let decls = declarations();
        let names: Vec<&str> = decls
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "authenticate_user",
                "navigate_to",
                "close_voice_control"
            ]
        );
    }
}

//! Configuration reading and data directory paths.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

/// Default realtime endpoint for the generative backend.
const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model.
const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

/// voice_config.json shape (written by the host UI settings panel).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub voice_name: String,
    pub input_device: Option<String>,
    pub playback_volume: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice_name: "Zephyr".to_string(),
            input_device: None,
            playback_volume: 1.0,
        }
    }
}

/// Read voice_config.json from the data directory. Missing or malformed
/// files fall back to defaults.
pub fn read_voice_config() -> VoiceConfig {
    read_json_file(&get_config_path()).unwrap_or_default()
}

/// Path to voice_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("voice_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let cfg: VoiceConfig = serde_json::from_str(r#"{"apiKey": "k-123"}"#).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("k-123"));
        assert_eq!(cfg.voice_name, "Zephyr");
        assert_eq!(cfg.model, DEFAULT_MODEL);
        assert_eq!(cfg.playback_volume, 1.0);
    }

    #[test]
    fn test_default_endpoint_is_realtime() {
        assert!(VoiceConfig::default().endpoint.starts_with("wss://"));
    }
}

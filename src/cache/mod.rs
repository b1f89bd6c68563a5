//! Offline command cache.
//!
//! A bounded, deduplicated, newest-first record of voice commands that were
//! executed while a live session was up. When the backend is unreachable the
//! session shows this list so the user can replay a previous command without
//! a connection. Storage is an injected key-value port so the cache is
//! testable without touching the filesystem.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::paths::get_data_dir;

/// The cache never holds more than this many entries; the oldest beyond the
/// cap are evicted.
pub const CACHE_CAPACITY: usize = 6;

/// Shown when a tool call arrives before any transcription did.
pub const DEFAULT_COMMAND_TEXT: &str = "Voice command";

/// One previously executed voice-triggered action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCommand {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    pub timestamp: i64,
}

/// Durable single-value storage port.
pub trait CommandStore: Send {
    fn read(&self) -> Option<String>;
    fn write(&self, payload: &str) -> anyhow::Result<()>;
}

/// File-backed store in the data directory. Writes go through a temp file
/// and a rename so a partial write is never observable.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn in_data_dir() -> Self {
        Self {
            path: get_data_dir().join("voice_command_cache.json"),
        }
    }
}

impl CommandStore for FileStore {
    fn read(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {}", self.path.display(), e);
                }
                None
            }
        }
    }

    fn write(&self, payload: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Bounded, deduplicated, persisted list of recent commands, newest first.
pub struct CommandCache {
    entries: Vec<CachedCommand>,
    store: Box<dyn CommandStore>,
}

impl CommandCache {
    /// Read persisted state. Malformed or absent data is treated as an
    /// empty cache, never an error.
    pub fn load(store: Box<dyn CommandStore>) -> Self {
        let entries = store
            .read()
            .and_then(|payload| match serde_json::from_str(&payload) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!("Discarding malformed command cache: {}", e);
                    None
                }
            })
            .unwrap_or_default();
        Self { entries, store }
    }

    pub fn entries(&self) -> &[CachedCommand] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CachedCommand> {
        self.entries.iter().find(|c| c.id == id)
    }

    /// Record an executed command: drop any prior entry with the same
    /// (action, args) pair, prepend, truncate to capacity, persist.
    pub fn record(&mut self, text: &str, action: Option<String>, args: Option<serde_json::Value>) {
        self.entries
            .retain(|c| !(c.action == action && c.args == args));
        self.entries.insert(
            0,
            CachedCommand {
                id: uuid::Uuid::new_v4().to_string(),
                text: text.to_string(),
                action,
                args,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        );
        self.entries.truncate(CACHE_CAPACITY);
        self.persist();
    }

    fn persist(&self) {
        match serde_json::to_string(&self.entries) {
            Ok(payload) => {
                if let Err(e) = self.store.write(&payload) {
                    warn!("Failed to persist command cache: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize command cache: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemStore {
        value: Arc<Mutex<Option<String>>>,
    }

    impl CommandStore for MemStore {
        fn read(&self) -> Option<String> {
            self.value.lock().unwrap().clone()
        }

        fn write(&self, payload: &str) -> anyhow::Result<()> {
            *self.value.lock().unwrap() = Some(payload.to_string());
            Ok(())
        }
    }

    fn empty_cache() -> (CommandCache, MemStore) {
        let store = MemStore::default();
        (CommandCache::load(Box::new(store.clone())), store)
    }

    #[test]
    fn test_load_treats_malformed_as_empty() {
        let store = MemStore::default();
        store.write("not json at all").unwrap();
        let cache = CommandCache::load(Box::new(store));
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn test_record_dedupes_by_effect_not_text() {
        let (mut cache, _) = empty_cache();
        cache.record(
            "go to chat",
            Some("navigate_to".into()),
            Some(json!({"destination": "chat"})),
        );
        cache.record(
            "open the chat tab",
            Some("navigate_to".into()),
            Some(json!({"destination": "chat"})),
        );
        assert_eq!(cache.entries().len(), 1);
        assert_eq!(cache.entries()[0].text, "open the chat tab");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (mut cache, _) = empty_cache();
        for i in 0..10 {
            cache.record(
                &format!("cmd {i}"),
                Some("navigate_to".into()),
                Some(json!({ "destination": format!("dest-{i}") })),
            );
        }
        assert_eq!(cache.entries().len(), CACHE_CAPACITY);
        assert_eq!(cache.entries()[0].text, "cmd 9");
        assert_eq!(cache.entries()[CACHE_CAPACITY - 1].text, "cmd 4");
    }

    #[test]
    fn test_persists_and_reloads() {
        let (mut cache, store) = empty_cache();
        cache.record("authenticate", Some("authenticate_user".into()), None);
        let reloaded = CommandCache::load(Box::new(store));
        assert_eq!(reloaded.entries().len(), 1);
        assert_eq!(reloaded.entries()[0].action.as_deref(), Some("authenticate_user"));
    }

    #[test]
    fn test_newest_first_ordering() {
        // Three prior commands while online; offline display is newest first.
        let (mut cache, _) = empty_cache();
        cache.record(
            "go to chat",
            Some("navigate_to".into()),
            Some(json!({"destination": "chat"})),
        );
        cache.record(
            "show functions",
            Some("navigate_to".into()),
            Some(json!({"destination": "functions"})),
        );
        cache.record("unlock", Some("authenticate_user".into()), None);

        let actions: Vec<_> = cache
            .entries()
            .iter()
            .map(|c| (c.action.clone().unwrap(), c.args.clone()))
            .collect();
        assert_eq!(actions[0].0, "authenticate_user");
        assert_eq!(actions[1].1, Some(json!({"destination": "functions"})));
        assert_eq!(actions[2].1, Some(json!({"destination": "chat"})));
    }
}

//! # storage
//!
//! Durable key-value persistence port.
//!
//! Persistence is an optimisation, not a correctness requirement: everything
//! stored here can be rebuilt from the server.  Callers therefore go through
//! [`load_json`] / [`save_json`], which log and swallow every failure.
//!
//! Two adapters ship with the crate:
//! * [`MemoryStore`]: process-local, used by tests and ephemeral sessions.
//! * [`FileStore`]: one file per key inside a directory (the runner's default).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};

pub const RECOMMENDATION_SNAPSHOT_KEY: &str = "signaldesk.recommendations.snapshot";
pub const STRATEGY_PLANS_KEY: &str = "signaldesk.strategy.plans";
pub const EXIT_HISTORY_KEY: &str = "signaldesk.exits.history";

// ─── Port ─────────────────────────────────────────────────────────────────────

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> SyncResult<()>;
}

/// Reads and decodes `key`; a missing or undecodable value is `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(key, error = %e, "Ignoring undecodable persisted value");
            None
        }
    }
}

/// Encodes and writes `value`; failures are logged and ignored.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(SyncError::from)
        .and_then(|raw| store.set(key, raw));
    if let Err(e) = result {
        debug!(key, error = %e, "Durable write skipped");
    }
}

// ─── MemoryStore ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> SyncResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SyncError::Storage("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

// ─── FileStore ────────────────────────────────────────────────────────────────

/// Stores each key as `<dir>/<sanitised key>.json`.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: String) -> SyncResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| SyncError::Storage(e.to_string()))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| SyncError::Storage(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| SyncError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_roundtrip_and_bad_json() {
        let store = MemoryStore::new();
        save_json(&store, "k", &json!({"a": 1}));
        let value: Option<serde_json::Value> = load_json(&store, "k");
        assert_eq!(value, Some(json!({"a": 1})));

        store.set("broken", "{oops".into()).unwrap();
        let broken: Option<serde_json::Value> = load_json(&store, "broken");
        assert_eq!(broken, None);
    }

    #[test]
    fn test_file_store_sanitises_keys() {
        let dir = std::env::temp_dir().join(format!("signaldesk-test-{}", uuid::Uuid::new_v4()));
        let store = FileStore::new(&dir);
        store.set("a/b:c", "\"x\"".into()).unwrap();
        assert_eq!(store.get("a/b:c").as_deref(), Some("\"x\""));
        assert!(dir.join("a_b_c.json").exists());
        assert_eq!(store.get("missing"), None);
        let _ = fs::remove_dir_all(&dir);
    }
}

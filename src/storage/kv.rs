use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// The local key-value primitive this core persists through.
///
/// Platform shells provide the real implementation (shared
/// preferences, a file, etc.); the core only assumes get/set-string
/// semantics. Failures of the primitive itself are out of scope here,
/// so the surface is deliberately infallible.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get_string(&self, key: &str) -> Option<String>;
    async fn set_string(&self, key: &str, value: String);
    async fn remove(&self, key: &str);
    async fn clear_all(&self);
}

/// In-memory implementation of `KeyValueStorage` for development and
/// testing.
pub struct InMemoryKeyValueStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl Default for InMemoryKeyValueStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKeyValueStorage {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored keys, for test assertions.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStorage for InMemoryKeyValueStorage {
    async fn get_string(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    async fn set_string(&self, key: &str, value: String) {
        debug!(key, bytes = value.len(), "Storing value in memory");
        self.entries.lock().unwrap().insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    async fn clear_all(&self) {
        debug!("Clearing all stored values");
        self.entries.lock().unwrap().clear();
    }
}

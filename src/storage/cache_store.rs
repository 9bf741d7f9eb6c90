use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::kv::KeyValueStorage;

/// Process-wide cache schema version. Bump it when the shape of any
/// cached payload changes; every entry written under an older version
/// is then treated as a miss and evicted on first read.
pub const SCHEMA_VERSION: u32 = 1;

const DEFAULT_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Envelope wrapping every cached payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    version: u32,
    timestamp: DateTime<Utc>,
    ttl_seconds: i64,
    data: serde_json::Value,
}

/// Versioned, TTL'd local cache over the key-value primitive.
///
/// Every read validates the envelope: a decode failure, a schema
/// version mismatch, or an expired TTL all look like a plain miss to
/// the caller, and the offending entry is evicted so it is never
/// considered again. There is no cross-key transactionality.
pub struct PersistentCacheStore {
    storage: Arc<dyn KeyValueStorage>,
    schema_version: u32,
}

impl PersistentCacheStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_schema_version(storage, SCHEMA_VERSION)
    }

    /// Mainly for tests that need to simulate a schema migration.
    pub fn with_schema_version(storage: Arc<dyn KeyValueStorage>, schema_version: u32) -> Self {
        Self {
            storage,
            schema_version,
        }
    }

    /// Writes `value` under `key`, wrapped with the current schema
    /// version, a write timestamp, and a TTL (24 hours by default).
    #[instrument(skip(self, value))]
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<std::time::Duration>,
    ) -> Result<(), serde_json::Error> {
        let entry = CacheEntry {
            version: self.schema_version,
            timestamp: Utc::now(),
            ttl_seconds: ttl
                .map(|d| d.as_secs() as i64)
                .unwrap_or(DEFAULT_TTL_SECONDS),
            data: serde_json::to_value(value)?,
        };
        let encoded = serde_json::to_string(&entry)?;
        self.storage.set_string(key, encoded).await;
        debug!(key, ttl_seconds = entry.ttl_seconds, "Cache entry written");
        Ok(())
    }

    /// Reads and decodes the entry under `key`. Any invalid entry —
    /// undecodable, written under a different schema version, or past
    /// its TTL — is evicted and reported as a miss.
    #[instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.storage.get_string(key).await?;

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(key, %error, "Undecodable cache entry, evicting");
                self.storage.remove(key).await;
                return None;
            }
        };

        if entry.version != self.schema_version {
            debug!(
                key,
                stored_version = entry.version,
                current_version = self.schema_version,
                "Cache entry from another schema version, evicting"
            );
            self.storage.remove(key).await;
            return None;
        }

        if Utc::now() - entry.timestamp > Duration::seconds(entry.ttl_seconds) {
            debug!(key, "Cache entry expired, evicting");
            self.storage.remove(key).await;
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, %error, "Cache payload failed to decode, evicting");
                self.storage.remove(key).await;
                None
            }
        }
    }

    /// Evicts one key. Used when the caller knows the entry is stale.
    pub async fn clear(&self, key: &str) {
        self.storage.remove(key).await;
    }

    /// Evicts everything. Used on sign-out.
    pub async fn clear_all(&self) {
        self.storage.clear_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::InMemoryKeyValueStorage;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        count: u32,
    }

    fn payload() -> Payload {
        Payload {
            name: "lineup".to_string(),
            count: 9,
        }
    }

    #[tokio::test]
    async fn round_trips_a_fresh_entry() {
        let storage = Arc::new(InMemoryKeyValueStorage::new());
        let store = PersistentCacheStore::new(storage);

        store.set_json("k", &payload(), None).await.unwrap();
        assert_eq!(store.get_json::<Payload>("k").await, Some(payload()));
    }

    #[tokio::test]
    async fn missing_key_is_a_miss() {
        let store = PersistentCacheStore::new(Arc::new(InMemoryKeyValueStorage::new()));
        assert_eq!(store.get_json::<Payload>("absent").await, None);
    }

    #[tokio::test]
    async fn schema_version_bump_invalidates_old_entries() {
        let storage = Arc::new(InMemoryKeyValueStorage::new());

        let old = PersistentCacheStore::with_schema_version(storage.clone(), 1);
        old.set_json("k", &payload(), None).await.unwrap();

        let new = PersistentCacheStore::with_schema_version(storage.clone(), 2);
        assert_eq!(new.get_json::<Payload>("k").await, None);
        // Evicted, not just skipped.
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_even_if_decodable() {
        let storage = Arc::new(InMemoryKeyValueStorage::new());
        let store = PersistentCacheStore::new(storage.clone());

        store
            .set_json("k", &payload(), Some(std::time::Duration::from_secs(0)))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(store.get_json::<Payload>("k").await, None);
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn garbage_bytes_are_a_silent_miss() {
        let storage = Arc::new(InMemoryKeyValueStorage::new());
        storage.set_string("k", "not json at all".to_string()).await;

        let store = PersistentCacheStore::new(storage.clone());
        assert_eq!(store.get_json::<Payload>("k").await, None);
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn wrong_payload_shape_is_a_silent_miss() {
        let storage = Arc::new(InMemoryKeyValueStorage::new());
        let store = PersistentCacheStore::new(storage.clone());

        store.set_json("k", &vec![1, 2, 3], None).await.unwrap();
        assert_eq!(store.get_json::<Payload>("k").await, None);
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn clear_and_clear_all_evict() {
        let storage = Arc::new(InMemoryKeyValueStorage::new());
        let store = PersistentCacheStore::new(storage.clone());

        store.set_json("a", &payload(), None).await.unwrap();
        store.set_json("b", &payload(), None).await.unwrap();

        store.clear("a").await;
        assert_eq!(storage.len(), 1);

        store.clear_all().await;
        assert!(storage.is_empty());
    }
}

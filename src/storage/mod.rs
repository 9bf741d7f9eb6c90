pub mod cache_store;
pub mod kv;

pub use cache_store::{PersistentCacheStore, SCHEMA_VERSION};
pub use kv::{InMemoryKeyValueStorage, KeyValueStorage};

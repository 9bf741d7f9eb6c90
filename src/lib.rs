// Client core for the HackTracker stats app: derived game state over an
// append-only at-bat log, optimistic mutations against the backend, and
// a versioned local cache for instant cold starts.

pub mod atbat;
pub mod collection;
pub mod event;
pub mod gamestate;
pub mod scoring;
pub mod shared;
pub mod storage;

// Re-export commonly used types for easier access in tests
pub use atbat::{AtBatApi, AtBatRecord, AtBatUpdate, GameSummary, NewAtBat, ValidationError};
pub use collection::{Collection, CollectionKey, MutationDescriptor, MutationEngine, MutationError};
pub use event::{CollectionEvent, EventBus};
pub use gamestate::{GameStateCache, GameStateError, GameWatch, InGameState};
pub use shared::{ApiError, ErrorType};
pub use storage::{InMemoryKeyValueStorage, KeyValueStorage, PersistentCacheStore};

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::event::{CollectionEvent, EventBus};

/// Identifies one published collection: the at-bat log of one game for
/// one team.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    pub game_id: String,
    pub team_id: String,
}

impl CollectionKey {
    pub fn new(game_id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            team_id: team_id.into(),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game_id, self.team_id)
    }
}

/// The single published value for one collection key.
///
/// Reads clone the current value. Writes go through `replace`, which
/// applies a transform to the value as it is at that moment (never a
/// caller-captured snapshot) and emits a change notification once the
/// new value is visible. This is the single-writer discipline the
/// mutation engine and the reactive cache both rely on.
pub struct Collection<T> {
    key: CollectionKey,
    value: Arc<RwLock<T>>,
    bus: EventBus,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: Arc::clone(&self.value),
            bus: self.bus.clone(),
        }
    }
}

impl<T: Clone + Send + Sync> Collection<T> {
    pub fn new(key: CollectionKey, initial: T, bus: EventBus) -> Self {
        Self {
            key,
            value: Arc::new(RwLock::new(initial)),
            bus,
        }
    }

    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    /// Snapshot of the current published value.
    pub async fn read(&self) -> T {
        self.value.read().await.clone()
    }

    /// Replaces the published value with `transform(current)` and emits
    /// the given event. The transform runs under the write lock, so it
    /// always sees the live value.
    pub async fn replace<F>(&self, transform: F, event: CollectionEvent)
    where
        F: FnOnce(T) -> T,
    {
        {
            let mut guard = self.value.write().await;
            let current = guard.clone();
            *guard = transform(current);
        }
        debug!(key = %self.key, event = event.event_type(), "Collection value replaced");
        self.bus.emit(event).await;
    }

    /// Replaces the whole value from a remote fetch.
    pub async fn load(&self, value: T) {
        self.replace(
            |_| value,
            CollectionEvent::Loaded {
                key: self.key.clone(),
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replace_operates_on_live_value() {
        let bus = EventBus::new();
        let collection = Collection::new(CollectionKey::new("g", "t"), vec![1], bus);

        collection
            .replace(
                |mut v| {
                    v.push(2);
                    v
                },
                CollectionEvent::OptimisticApplied {
                    key: collection.key().clone(),
                },
            )
            .await;

        assert_eq!(collection.read().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn load_notifies_subscribers() {
        let bus = EventBus::new();
        let key = CollectionKey::new("g", "t");
        let mut receiver = bus.subscribe(&key).await;
        let collection = Collection::new(key, Vec::<i32>::new(), bus);

        collection.load(vec![7]).await;

        assert_eq!(receiver.recv().await.unwrap().event_type(), "loaded");
        assert_eq!(collection.read().await, vec![7]);
    }
}

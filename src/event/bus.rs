use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::events::CollectionEvent;
use crate::collection::CollectionKey;

/// Event bus distributing collection-change notifications.
///
/// Each collection key gets its own broadcast channel, created on
/// demand. Emitting to a key nobody listens to is not an error; the
/// reactive cache may attach later and will fetch fresh state anyway.
#[derive(Debug, Clone)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<CollectionKey, broadcast::Sender<CollectionEvent>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Emits an event to all subscribers of the event's collection.
    pub async fn emit(&self, event: CollectionEvent) {
        let key = event.key().clone();
        let channels = self.channels.read().await;

        if let Some(sender) = channels.get(&key) {
            match sender.send(event) {
                Ok(receiver_count) => {
                    debug!(%key, receivers = receiver_count, "Collection event emitted");
                }
                Err(_) => {
                    debug!(%key, "Collection event emitted with no receivers");
                }
            }
        } else {
            debug!(%key, "No channel for collection - creating one");
            drop(channels);

            let mut channels = self.channels.write().await;
            let sender = channels
                .entry(key.clone())
                .or_insert_with(|| broadcast::channel(100).0)
                .clone();

            if sender.send(event).is_err() {
                debug!(%key, "Collection event sent to new channel with no receivers");
            }
        }
    }

    /// Subscribe to change notifications for one collection.
    pub async fn subscribe(&self, key: &CollectionKey) -> broadcast::Receiver<CollectionEvent> {
        let channels = self.channels.read().await;

        if let Some(sender) = channels.get(key) {
            sender.subscribe()
        } else {
            debug!(%key, "Creating new channel for subscription");
            drop(channels);

            let mut channels = self.channels.write().await;
            channels
                .entry(key.clone())
                .or_insert_with(|| broadcast::channel(100).0)
                .subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CollectionKey {
        CollectionKey::new("game-1", "team-1")
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe(&key()).await;

        bus.emit(CollectionEvent::Loaded { key: key() }).await;

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "loaded");
        assert_eq!(event.key(), &key());
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(CollectionEvent::RolledBack { key: key() }).await;

        // A later subscriber only sees events emitted after attach.
        let mut receiver = bus.subscribe(&key()).await;
        bus.emit(CollectionEvent::Loaded { key: key() }).await;
        assert_eq!(receiver.recv().await.unwrap().event_type(), "loaded");
    }

    #[tokio::test]
    async fn channels_are_isolated_per_collection() {
        let bus = EventBus::new();
        let other = CollectionKey::new("game-2", "team-1");
        let mut receiver = bus.subscribe(&other).await;

        bus.emit(CollectionEvent::Loaded { key: key() }).await;
        bus.emit(CollectionEvent::Loaded { key: other.clone() }).await;

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.key(), &other);
        assert!(receiver.try_recv().is_err());
    }
}

use crate::collection::CollectionKey;

/// Notifications emitted whenever a published collection value changes.
///
/// Events are facts about edits that have already been applied. The
/// reactive game-state cache does not care which kind of edit happened,
/// only that the collection is different; the distinction exists for
/// logging and tests.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    /// The whole collection was replaced from a remote fetch.
    Loaded { key: CollectionKey },

    /// An optimistic edit was applied ahead of remote confirmation.
    OptimisticApplied { key: CollectionKey },

    /// A remote result was reconciled into the live collection.
    ResultApplied { key: CollectionKey },

    /// A failed mutation's optimistic edit was rolled back.
    RolledBack { key: CollectionKey },
}

impl CollectionEvent {
    /// The collection this event belongs to.
    pub fn key(&self) -> &CollectionKey {
        match self {
            CollectionEvent::Loaded { key } => key,
            CollectionEvent::OptimisticApplied { key } => key,
            CollectionEvent::ResultApplied { key } => key,
            CollectionEvent::RolledBack { key } => key,
        }
    }

    /// Short name for structured logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            CollectionEvent::Loaded { .. } => "loaded",
            CollectionEvent::OptimisticApplied { .. } => "optimistic_applied",
            CollectionEvent::ResultApplied { .. } => "result_applied",
            CollectionEvent::RolledBack { .. } => "rolled_back",
        }
    }
}

pub mod cache;
pub mod reducer;

pub use cache::{GameStateCache, GameStateError, GameStateSubscription, GameWatch};
pub use reducer::{compute, InGameState};

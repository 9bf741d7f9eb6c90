pub mod api;
pub mod models;

pub use api::{AtBatApi, InMemoryAtBatApi};
pub use models::{
    validate_at_bat_update, validate_new_at_bat, AtBatRecord, AtBatUpdate, GameStatus, GameSummary,
    LineupSlot, NewAtBat, ValidationError,
};

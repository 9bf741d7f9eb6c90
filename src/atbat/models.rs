use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// One recorded plate appearance, as the backend returns it.
///
/// Records are immutable facts: once created, only an explicit update
/// replaces fields, and even then `at_bat_id`, `created_at`, and the
/// local `seq` survive so the record keeps its identity and its place
/// in creation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtBatRecord {
    pub at_bat_id: String,
    pub game_id: String,
    pub player_id: String,
    pub team_id: String,
    pub result: String,
    pub inning: u32,
    pub outs: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batting_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rbis: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic sequence number assigned when the record first enters
    /// the local collection. Never sent over the wire; it breaks ties
    /// between records whose `created_at` collide at clock resolution.
    #[serde(default)]
    pub seq: u64,
}

impl AtBatRecord {
    /// Ordering key for deterministic replay: creation time, then the
    /// locally assigned sequence number.
    pub fn replay_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }
}

/// Payload for recording a new at-bat.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAtBat {
    pub player_id: String,
    pub result: String,
    pub inning: u32,
    pub outs: u8,
    pub batting_order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rbis: Option<u8>,
}

/// Partial update for an existing at-bat. `None` fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtBatUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inning: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outs: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rbis: Option<u8>,
}

impl AtBatUpdate {
    /// Applies this update to a record, keeping identity and creation
    /// order (`at_bat_id`, `created_at`, `seq`) intact.
    pub fn apply_to(&self, record: &AtBatRecord, updated_at: DateTime<Utc>) -> AtBatRecord {
        let mut next = record.clone();
        if let Some(result) = &self.result {
            next.result = result.clone();
        }
        if let Some(inning) = self.inning {
            next.inning = inning;
        }
        if let Some(outs) = self.outs {
            next.outs = outs;
        }
        if let Some(hit_location) = &self.hit_location {
            next.hit_location = Some(hit_location.clone());
        }
        if let Some(hit_type) = &self.hit_type {
            next.hit_type = Some(hit_type.clone());
        }
        if let Some(rbis) = self.rbis {
            next.rbis = Some(rbis);
        }
        next.updated_at = updated_at;
        next
    }
}

/// One slot in a game's batting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineupSlot {
    pub player_id: String,
    pub batting_order: u32,
}

/// Game lifecycle status as the backend models it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Completed,
}

/// The slice of the game resource this core reads: lifecycle status and
/// the lineup attached to the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub game_id: String,
    pub team_id: String,
    pub status: GameStatus,
    #[serde(default)]
    pub lineup: Vec<LineupSlot>,
}

/// A recording request that failed client-side checks before any
/// network traffic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("result is required")]
    MissingResult,
    #[error("inning must be 1 or greater")]
    InvalidInning,
    #[error("outs must be between 0 and 2")]
    InvalidOuts,
    #[error("rbis must be between 0 and 4")]
    InvalidRbis,
    #[error("battingOrder must be 1 or greater")]
    InvalidBattingOrder,
    #[error("game must be IN_PROGRESS to record at-bats")]
    GameNotInProgress,
    #[error("player must be in the game lineup to record an at-bat")]
    PlayerNotInLineup,
    #[error("lineup is empty")]
    EmptyLineup,
}

/// Client-side mirror of the backend's at-bat validators, so a bad
/// request fails before the optimistic edit is ever applied.
pub fn validate_new_at_bat(game: &GameSummary, at_bat: &NewAtBat) -> Result<(), ValidationError> {
    if at_bat.result.trim().is_empty() {
        return Err(ValidationError::MissingResult);
    }
    if at_bat.inning < 1 {
        return Err(ValidationError::InvalidInning);
    }
    if at_bat.outs > 2 {
        return Err(ValidationError::InvalidOuts);
    }
    if at_bat.batting_order < 1 {
        return Err(ValidationError::InvalidBattingOrder);
    }
    if let Some(rbis) = at_bat.rbis {
        if rbis > 4 {
            return Err(ValidationError::InvalidRbis);
        }
    }
    if game.status != GameStatus::InProgress {
        return Err(ValidationError::GameNotInProgress);
    }
    if !game.lineup.is_empty()
        && !game.lineup.iter().any(|slot| slot.player_id == at_bat.player_id)
    {
        return Err(ValidationError::PlayerNotInLineup);
    }
    Ok(())
}

/// Same field bounds as `validate_new_at_bat`, applied to whichever
/// fields an update actually carries.
pub fn validate_at_bat_update(update: &AtBatUpdate) -> Result<(), ValidationError> {
    if let Some(result) = &update.result {
        if result.trim().is_empty() {
            return Err(ValidationError::MissingResult);
        }
    }
    if let Some(inning) = update.inning {
        if inning < 1 {
            return Err(ValidationError::InvalidInning);
        }
    }
    if let Some(outs) = update.outs {
        if outs > 2 {
            return Err(ValidationError::InvalidOuts);
        }
    }
    if let Some(rbis) = update.rbis {
        if rbis > 4 {
            return Err(ValidationError::InvalidRbis);
        }
    }
    Ok(())
}

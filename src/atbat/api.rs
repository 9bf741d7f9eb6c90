use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::models::{AtBatRecord, AtBatUpdate, GameSummary, NewAtBat};
use crate::shared::ApiError;

/// The authenticated request client for at-bat and game endpoints.
///
/// Implementations own transport, auth headers, and timeouts; this core
/// only sees typed results. Every non-2xx response surfaces as an
/// `ApiError`.
#[async_trait]
pub trait AtBatApi {
    async fn create_at_bat(
        &self,
        game_id: &str,
        at_bat: &NewAtBat,
    ) -> Result<AtBatRecord, ApiError>;

    async fn update_at_bat(
        &self,
        game_id: &str,
        at_bat_id: &str,
        update: &AtBatUpdate,
    ) -> Result<AtBatRecord, ApiError>;

    async fn delete_at_bat(&self, game_id: &str, at_bat_id: &str) -> Result<(), ApiError>;

    async fn list_at_bats(&self, game_id: &str) -> Result<Vec<AtBatRecord>, ApiError>;

    async fn get_game(&self, game_id: &str) -> Result<GameSummary, ApiError>;
}

/// In-memory implementation of `AtBatApi` for development and testing.
///
/// Behaves like the real backend over local maps: create assigns the
/// server id and timestamps, update patches fields, delete removes.
/// Tests can script failures with `fail_next`, which makes the next
/// mutating call return the queued error instead.
pub struct InMemoryAtBatApi {
    games: Mutex<HashMap<String, GameSummary>>,
    at_bats: Mutex<HashMap<String, Vec<AtBatRecord>>>,
    scripted_failures: Mutex<VecDeque<ApiError>>,
}

impl Default for InMemoryAtBatApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAtBatApi {
    pub fn new() -> Self {
        Self {
            games: Mutex::new(HashMap::new()),
            at_bats: Mutex::new(HashMap::new()),
            scripted_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Registers a game resource the fake will serve.
    pub fn insert_game(&self, game: GameSummary) {
        let mut games = self.games.lock().unwrap();
        games.insert(game.game_id.clone(), game);
    }

    /// Pre-populates the at-bat log for a game.
    pub fn insert_at_bats(&self, game_id: &str, records: Vec<AtBatRecord>) {
        let mut at_bats = self.at_bats.lock().unwrap();
        at_bats.insert(game_id.to_string(), records);
    }

    /// Queues an error; the next mutating call consumes and returns it.
    pub fn fail_next(&self, error: ApiError) {
        self.scripted_failures.lock().unwrap().push_back(error);
    }

    /// Number of at-bats currently stored for a game.
    pub fn at_bat_count(&self, game_id: &str) -> usize {
        self.at_bats
            .lock()
            .unwrap()
            .get(game_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn take_scripted_failure(&self) -> Option<ApiError> {
        self.scripted_failures.lock().unwrap().pop_front()
    }

    fn require_game(&self, game_id: &str) -> Result<GameSummary, ApiError> {
        let games = self.games.lock().unwrap();
        games
            .get(game_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("Game not found"))
    }
}

#[async_trait]
impl AtBatApi for InMemoryAtBatApi {
    #[instrument(skip(self, at_bat))]
    async fn create_at_bat(
        &self,
        game_id: &str,
        at_bat: &NewAtBat,
    ) -> Result<AtBatRecord, ApiError> {
        if let Some(error) = self.take_scripted_failure() {
            warn!(game_id, %error, "Scripted failure for create_at_bat");
            return Err(error);
        }

        let game = self.require_game(game_id)?;
        let now = Utc::now();
        let record = AtBatRecord {
            at_bat_id: Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            player_id: at_bat.player_id.clone(),
            team_id: game.team_id.clone(),
            result: at_bat.result.clone(),
            inning: at_bat.inning,
            outs: at_bat.outs,
            batting_order: Some(at_bat.batting_order),
            hit_location: at_bat.hit_location.clone(),
            hit_type: at_bat.hit_type.clone(),
            rbis: at_bat.rbis,
            created_at: now,
            updated_at: now,
            seq: 0,
        };

        let mut at_bats = self.at_bats.lock().unwrap();
        at_bats
            .entry(game_id.to_string())
            .or_default()
            .push(record.clone());

        debug!(game_id, at_bat_id = %record.at_bat_id, "At-bat created in memory");
        Ok(record)
    }

    #[instrument(skip(self, update))]
    async fn update_at_bat(
        &self,
        game_id: &str,
        at_bat_id: &str,
        update: &AtBatUpdate,
    ) -> Result<AtBatRecord, ApiError> {
        if let Some(error) = self.take_scripted_failure() {
            warn!(game_id, at_bat_id, %error, "Scripted failure for update_at_bat");
            return Err(error);
        }

        let mut at_bats = self.at_bats.lock().unwrap();
        let records = at_bats
            .get_mut(game_id)
            .ok_or_else(|| ApiError::not_found("Game not found"))?;
        let record = records
            .iter_mut()
            .find(|r| r.at_bat_id == at_bat_id)
            .ok_or_else(|| ApiError::not_found("At-bat not found"))?;

        *record = update.apply_to(record, Utc::now());
        debug!(game_id, at_bat_id, "At-bat updated in memory");
        Ok(record.clone())
    }

    #[instrument(skip(self))]
    async fn delete_at_bat(&self, game_id: &str, at_bat_id: &str) -> Result<(), ApiError> {
        if let Some(error) = self.take_scripted_failure() {
            warn!(game_id, at_bat_id, %error, "Scripted failure for delete_at_bat");
            return Err(error);
        }

        let mut at_bats = self.at_bats.lock().unwrap();
        let records = at_bats
            .get_mut(game_id)
            .ok_or_else(|| ApiError::not_found("Game not found"))?;
        let before = records.len();
        records.retain(|r| r.at_bat_id != at_bat_id);
        if records.len() == before {
            return Err(ApiError::not_found("At-bat not found"));
        }

        debug!(game_id, at_bat_id, "At-bat deleted from memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_at_bats(&self, game_id: &str) -> Result<Vec<AtBatRecord>, ApiError> {
        self.require_game(game_id)?;
        let at_bats = self.at_bats.lock().unwrap();
        Ok(at_bats.get(game_id).cloned().unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn get_game(&self, game_id: &str) -> Result<GameSummary, ApiError> {
        self.require_game(game_id)
    }
}

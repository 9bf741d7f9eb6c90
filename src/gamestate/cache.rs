use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::reducer::{self, InGameState};
use crate::atbat::{
    validate_at_bat_update, validate_new_at_bat, AtBatApi, AtBatRecord, AtBatUpdate, GameSummary,
    NewAtBat, ValidationError,
};
use crate::collection::{
    Collection, CollectionKey, MutationDescriptor, MutationEngine, MutationError,
};
use crate::event::{CollectionEvent, EventBus};
use crate::storage::PersistentCacheStore;

/// How long a cache entry survives after its last observer detaches.
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);

/// What observers of one game's derived state see.
///
/// There is deliberately no error state: a failed fetch leaves the
/// watch at `Loading`, and a failed recompute keeps the last good
/// `Data`. Staleness beats an error screen mid-game.
#[derive(Debug, Clone, PartialEq)]
pub enum GameWatch {
    Loading,
    Data(InGameState),
}

/// Errors surfaced to the UI from recording operations.
#[derive(Debug, Error)]
pub enum GameStateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Api(#[from] crate::shared::ApiError),
    #[error("at-bat {0} is not in the local collection")]
    UnknownAtBat(String),
}

/// Snapshot persisted per game for instant cold starts: the raw inputs
/// of the reducer, never the derived state itself, which is always
/// recomputed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedGameLog {
    game: GameSummary,
    at_bats: Vec<AtBatRecord>,
}

struct CacheSlot {
    engine: Arc<MutationEngine<Vec<AtBatRecord>>>,
    game: Arc<RwLock<Option<GameSummary>>>,
    watch_tx: Arc<watch::Sender<GameWatch>>,
    next_seq: Arc<AtomicU64>,
    observers: usize,
    listener: JoinHandle<()>,
    release_timer: Option<JoinHandle<()>>,
}

struct CacheShared {
    entries: StdMutex<HashMap<CollectionKey, CacheSlot>>,
    keep_alive: Duration,
}

/// RAII handle for one observer of one game's derived state. Dropping
/// it arms the deferred-release timer once the observer count reaches
/// zero.
pub struct GameStateSubscription {
    shared: Arc<CacheShared>,
    key: CollectionKey,
}

impl Drop for GameStateSubscription {
    fn drop(&mut self) {
        detach_observer(&self.shared, &self.key);
    }
}

/// Reactive memoizing wrapper around the game-state reducer, keyed by
/// `(gameId, teamId)`.
///
/// Each entry owns the published at-bat collection, a mutation engine
/// over it, and a listener that re-runs the reducer whenever the
/// collection changes. Entries are reference counted by observer and
/// released only after a keep-alive grace period, so briefly leaving
/// and re-entering a game screen never pays the recompute cost.
pub struct GameStateCache {
    api: Arc<dyn AtBatApi + Send + Sync>,
    bus: EventBus,
    store: Arc<PersistentCacheStore>,
    shared: Arc<CacheShared>,
}

impl GameStateCache {
    pub fn new(
        api: Arc<dyn AtBatApi + Send + Sync>,
        bus: EventBus,
        store: Arc<PersistentCacheStore>,
    ) -> Self {
        Self::with_keep_alive(api, bus, store, DEFAULT_KEEP_ALIVE)
    }

    pub fn with_keep_alive(
        api: Arc<dyn AtBatApi + Send + Sync>,
        bus: EventBus,
        store: Arc<PersistentCacheStore>,
        keep_alive: Duration,
    ) -> Self {
        Self {
            api,
            bus,
            store,
            shared: Arc::new(CacheShared {
                entries: StdMutex::new(HashMap::new()),
                keep_alive,
            }),
        }
    }

    /// Attaches an observer. The receiver starts at `Loading` for a
    /// fresh entry and at the current value for a kept-alive one.
    pub async fn subscribe(
        &self,
        key: &CollectionKey,
    ) -> (GameStateSubscription, watch::Receiver<GameWatch>) {
        let receiver = self.attach_observer(key).await;
        (
            GameStateSubscription {
                shared: Arc::clone(&self.shared),
                key: key.clone(),
            },
            receiver,
        )
    }

    /// True while an entry (observed or kept alive) exists for the key.
    pub fn is_cached(&self, key: &CollectionKey) -> bool {
        self.shared.entries.lock().unwrap().contains_key(key)
    }

    /// The most recently created at-bat in the collection, if any.
    /// Used to resume an edit in progress.
    pub async fn get_last_at_bat(&self, key: &CollectionKey) -> Option<AtBatRecord> {
        let engine = self.existing_engine(key)?;
        let events = engine.collection().read().await;
        events.into_iter().max_by_key(|e| e.replay_key())
    }

    /// Records a new at-bat through the collection's mutation engine.
    /// The derived state refreshes through the change-notification
    /// path; this method never computes state itself.
    pub async fn record_at_bat(
        &self,
        key: &CollectionKey,
        new_at_bat: NewAtBat,
    ) -> Result<AtBatRecord, GameStateError> {
        let (engine, game, next_seq) = self.slot_handles(key).await;
        let summary = self.game_summary(key, &game).await?;
        validate_new_at_bat(&summary, &new_at_bat)?;

        let temp_id = format!("pending-{}", Uuid::new_v4());
        let now = Utc::now();
        let optimistic = AtBatRecord {
            at_bat_id: temp_id.clone(),
            game_id: key.game_id.clone(),
            player_id: new_at_bat.player_id.clone(),
            team_id: key.team_id.clone(),
            result: new_at_bat.result.clone(),
            inning: new_at_bat.inning,
            outs: new_at_bat.outs,
            batting_order: Some(new_at_bat.batting_order),
            hit_location: new_at_bat.hit_location.clone(),
            hit_type: new_at_bat.hit_type.clone(),
            rbis: new_at_bat.rbis,
            created_at: now,
            updated_at: now,
            seq: next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let api = Arc::clone(&self.api);
        let game_id = key.game_id.clone();
        let request = new_at_bat.clone();
        let optimistic_seq = optimistic.seq;
        let rollback_id = temp_id.clone();

        let descriptor = MutationDescriptor {
            optimistic_update: Box::new(move |mut events: Vec<AtBatRecord>| {
                events.push(optimistic);
                events
            }),
            api_call: Box::pin(
                async move { api.create_at_bat(&game_id, &request).await },
            ),
            apply_result: Box::new(move |mut events, confirmed: &AtBatRecord| {
                // Swap the temporary identity for the server's, keeping
                // the local sequence number so creation order is stable
                // across the confirm. A full reload racing the call may
                // already carry the confirmed record; don't duplicate it.
                let mut confirmed = confirmed.clone();
                confirmed.seq = optimistic_seq;
                if let Some(index) = events.iter().position(|e| e.at_bat_id == temp_id) {
                    events[index] = confirmed;
                } else if !events.iter().any(|e| e.at_bat_id == confirmed.at_bat_id) {
                    events.push(confirmed);
                }
                events
            }),
            rollback: Box::new(move |mut events| {
                events.retain(|e| e.at_bat_id != rollback_id);
                events
            }),
        };

        let record = engine.mutate(descriptor).await?;
        info!(%key, at_bat_id = %record.at_bat_id, result = %record.result, "At-bat recorded");
        Ok(record)
    }

    /// Applies a partial update to an existing at-bat. Identity and
    /// creation order are preserved; on failure the original record is
    /// restored in place.
    pub async fn update_at_bat(
        &self,
        key: &CollectionKey,
        at_bat_id: &str,
        update: AtBatUpdate,
    ) -> Result<AtBatRecord, GameStateError> {
        validate_at_bat_update(&update)?;
        let (engine, _, _) = self.slot_handles(key).await;

        let original = engine
            .collection()
            .read()
            .await
            .into_iter()
            .find(|e| e.at_bat_id == at_bat_id)
            .ok_or_else(|| GameStateError::UnknownAtBat(at_bat_id.to_string()))?;

        let api = Arc::clone(&self.api);
        let game_id = key.game_id.clone();
        let target = at_bat_id.to_string();
        let request = update.clone();

        let optimistic_target = target.clone();
        let optimistic_update = update.clone();
        let apply_target = target.clone();
        let original_seq = original.seq;
        let rollback_original = original;

        let descriptor = MutationDescriptor {
            optimistic_update: Box::new(move |mut events: Vec<AtBatRecord>| {
                if let Some(record) = events.iter_mut().find(|e| e.at_bat_id == optimistic_target) {
                    *record = optimistic_update.apply_to(record, Utc::now());
                }
                events
            }),
            api_call: Box::pin(async move {
                api.update_at_bat(&game_id, &target, &request).await
            }),
            apply_result: Box::new(move |mut events, confirmed: &AtBatRecord| {
                if let Some(record) = events.iter_mut().find(|e| e.at_bat_id == apply_target) {
                    *record = confirmed.clone();
                    record.seq = original_seq;
                }
                events
            }),
            rollback: Box::new(move |mut events| {
                if let Some(record) = events
                    .iter_mut()
                    .find(|e| e.at_bat_id == rollback_original.at_bat_id)
                {
                    *record = rollback_original;
                }
                events
            }),
        };

        let record = engine.mutate(descriptor).await?;
        Ok(record)
    }

    /// Removes an at-bat. On failure the record is restored.
    pub async fn delete_at_bat(
        &self,
        key: &CollectionKey,
        at_bat_id: &str,
    ) -> Result<(), GameStateError> {
        let (engine, _, _) = self.slot_handles(key).await;

        let original = engine
            .collection()
            .read()
            .await
            .into_iter()
            .find(|e| e.at_bat_id == at_bat_id)
            .ok_or_else(|| GameStateError::UnknownAtBat(at_bat_id.to_string()))?;

        let api = Arc::clone(&self.api);
        let game_id = key.game_id.clone();
        let target = at_bat_id.to_string();
        let optimistic_target = target.clone();

        let descriptor = MutationDescriptor {
            optimistic_update: Box::new(move |mut events: Vec<AtBatRecord>| {
                events.retain(|e| e.at_bat_id != optimistic_target);
                events
            }),
            api_call: Box::pin(async move { api.delete_at_bat(&game_id, &target).await }),
            apply_result: Box::new(|events, _| events),
            rollback: Box::new(move |mut events| {
                events.push(original);
                events
            }),
        };

        engine.mutate(descriptor).await?;
        Ok(())
    }

    async fn attach_observer(&self, key: &CollectionKey) -> watch::Receiver<GameWatch> {
        // Fast path: entry already exists (observed or kept alive).
        {
            let mut entries = self.shared.entries.lock().unwrap();
            if let Some(slot) = entries.get_mut(key) {
                slot.observers += 1;
                if let Some(timer) = slot.release_timer.take() {
                    debug!(%key, "Observer re-attached, cancelling deferred release");
                    timer.abort();
                }
                return slot.watch_tx.subscribe();
            }
        }

        // Subscribe to the bus before the slot becomes visible so no
        // change notification can slip between insert and listen.
        let bus_receiver = self.bus.subscribe(key).await;
        let slot = self.build_slot(key, bus_receiver);
        let receiver = slot.watch_tx.subscribe();

        let loader = {
            let mut entries = self.shared.entries.lock().unwrap();
            if let Some(existing) = entries.get_mut(key) {
                // Lost the race to a concurrent first subscriber.
                slot.listener.abort();
                existing.observers += 1;
                if let Some(timer) = existing.release_timer.take() {
                    timer.abort();
                }
                return existing.watch_tx.subscribe();
            }
            let loader = self.spawn_initial_load(key, &slot);
            entries.insert(key.clone(), slot);
            loader
        };
        drop(loader);

        receiver
    }

    fn build_slot(
        &self,
        key: &CollectionKey,
        bus_receiver: broadcast::Receiver<CollectionEvent>,
    ) -> CacheSlot {
        let collection = Collection::new(key.clone(), Vec::new(), self.bus.clone());
        let engine = Arc::new(MutationEngine::new(collection));
        let game = Arc::new(RwLock::new(None));
        let (watch_tx, _) = watch::channel(GameWatch::Loading);
        let watch_tx = Arc::new(watch_tx);

        let listener = self.spawn_listener(key, bus_receiver, &engine, &game, &watch_tx);

        CacheSlot {
            engine,
            game,
            watch_tx,
            next_seq: Arc::new(AtomicU64::new(0)),
            observers: 1,
            listener,
            release_timer: None,
        }
    }

    /// The background recompute loop: one per cache entry, alive until
    /// the entry is released.
    fn spawn_listener(
        &self,
        key: &CollectionKey,
        mut bus_receiver: broadcast::Receiver<CollectionEvent>,
        engine: &Arc<MutationEngine<Vec<AtBatRecord>>>,
        game: &Arc<RwLock<Option<GameSummary>>>,
        watch_tx: &Arc<watch::Sender<GameWatch>>,
    ) -> JoinHandle<()> {
        let key = key.clone();
        let engine = Arc::clone(engine);
        let game = Arc::clone(game);
        let watch_tx = Arc::clone(watch_tx);
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            loop {
                match bus_receiver.recv().await {
                    Ok(event) => {
                        debug!(%key, event = event.event_type(), "Collection changed, recomputing");
                        recompute_and_publish(&key, &engine, &game, &watch_tx, &store).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // The reducer only needs the latest collection
                        // value, so one catch-up recompute covers every
                        // dropped notification.
                        warn!(%key, skipped, "Listener lagged behind notifications, catching up");
                        recompute_and_publish(&key, &engine, &game, &watch_tx, &store).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(%key, "Collection listener ended");
        })
    }

    fn spawn_initial_load(&self, key: &CollectionKey, slot: &CacheSlot) -> JoinHandle<()> {
        let key = key.clone();
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let engine = Arc::clone(&slot.engine);
        let game = Arc::clone(&slot.game);
        let next_seq = Arc::clone(&slot.next_seq);

        tokio::spawn(async move {
            // Hydrate from the local cache first so a relaunch renders
            // before the network round-trip resolves.
            if let Some(snapshot) = store.get_json::<CachedGameLog>(&snapshot_key(&key)).await {
                info!(%key, at_bats = snapshot.at_bats.len(), "Hydrated game log from local cache");
                let top = snapshot
                    .at_bats
                    .iter()
                    .map(|e| e.seq + 1)
                    .max()
                    .unwrap_or(0);
                next_seq.fetch_max(top, Ordering::Relaxed);
                *game.write().await = Some(snapshot.game);
                engine.collection().load(snapshot.at_bats).await;
            }

            match fetch_remote(&api, &key, &next_seq).await {
                Ok((summary, at_bats)) => {
                    *game.write().await = Some(summary);
                    engine.collection().load(at_bats).await;
                }
                Err(error) => {
                    // Whatever we have (hydrated data or Loading) stays.
                    warn!(%key, %error, "Initial fetch failed, serving cached state");
                }
            }
        })
    }

    async fn slot_handles(
        &self,
        key: &CollectionKey,
    ) -> (
        Arc<MutationEngine<Vec<AtBatRecord>>>,
        Arc<RwLock<Option<GameSummary>>>,
        Arc<AtomicU64>,
    ) {
        if let Some(handles) = self.existing_handles(key) {
            return handles;
        }

        // Recording from a screen that never subscribed still works:
        // create the entry and let keep-alive reclaim it. The initial
        // load runs here too, so the collection fills in around the
        // recorded at-bat and the persisted snapshot stays complete.
        let bus_receiver = self.bus.subscribe(key).await;
        let mut slot = self.build_slot(key, bus_receiver);
        slot.observers = 0;

        let mut entries = self.shared.entries.lock().unwrap();
        if let Some(existing) = entries.get(key) {
            slot.listener.abort();
            return (
                Arc::clone(&existing.engine),
                Arc::clone(&existing.game),
                Arc::clone(&existing.next_seq),
            );
        }
        let handles = (
            Arc::clone(&slot.engine),
            Arc::clone(&slot.game),
            Arc::clone(&slot.next_seq),
        );
        slot.release_timer = Some(spawn_release_timer(&self.shared, key));
        let loader = self.spawn_initial_load(key, &slot);
        entries.insert(key.clone(), slot);
        drop(entries);
        drop(loader);
        handles
    }

    fn existing_handles(
        &self,
        key: &CollectionKey,
    ) -> Option<(
        Arc<MutationEngine<Vec<AtBatRecord>>>,
        Arc<RwLock<Option<GameSummary>>>,
        Arc<AtomicU64>,
    )> {
        let entries = self.shared.entries.lock().unwrap();
        entries.get(key).map(|slot| {
            (
                Arc::clone(&slot.engine),
                Arc::clone(&slot.game),
                Arc::clone(&slot.next_seq),
            )
        })
    }

    fn existing_engine(
        &self,
        key: &CollectionKey,
    ) -> Option<Arc<MutationEngine<Vec<AtBatRecord>>>> {
        self.existing_handles(key).map(|(engine, _, _)| engine)
    }

    async fn game_summary(
        &self,
        key: &CollectionKey,
        game: &Arc<RwLock<Option<GameSummary>>>,
    ) -> Result<GameSummary, GameStateError> {
        if let Some(summary) = game.read().await.clone() {
            return Ok(summary);
        }
        let summary = self.api.get_game(&key.game_id).await?;
        *game.write().await = Some(summary.clone());
        Ok(summary)
    }
}

fn snapshot_key(key: &CollectionKey) -> String {
    format!("atbats:{}:{}", key.game_id, key.team_id)
}

async fn fetch_remote(
    api: &Arc<dyn AtBatApi + Send + Sync>,
    key: &CollectionKey,
    next_seq: &Arc<AtomicU64>,
) -> Result<(GameSummary, Vec<AtBatRecord>), crate::shared::ApiError> {
    let summary = api.get_game(&key.game_id).await?;
    let mut at_bats = api.list_at_bats(&key.game_id).await?;

    // Server records carry no sequence number; assign arrival order by
    // creation time (id as a stable fallback for exact ties).
    at_bats.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.at_bat_id.cmp(&b.at_bat_id))
    });
    let base = next_seq.fetch_add(at_bats.len() as u64, Ordering::Relaxed);
    for (index, record) in at_bats.iter_mut().enumerate() {
        record.seq = base + index as u64;
    }

    Ok((summary, at_bats))
}

/// Re-runs the reducer against the live collection and publishes the
/// result. A failure keeps the last published value: stale data over an
/// error state.
async fn recompute_and_publish(
    key: &CollectionKey,
    engine: &Arc<MutationEngine<Vec<AtBatRecord>>>,
    game: &Arc<RwLock<Option<GameSummary>>>,
    watch_tx: &Arc<watch::Sender<GameWatch>>,
    store: &Arc<PersistentCacheStore>,
) {
    let events = engine.collection().read().await;
    let Some(summary) = game.read().await.clone() else {
        debug!(%key, "No game summary yet, skipping recompute");
        return;
    };

    match reducer::compute(&events, &summary.lineup) {
        Ok(state) => {
            let snapshot = CachedGameLog {
                game: summary,
                at_bats: events,
            };
            if let Err(error) = store.set_json(&snapshot_key(key), &snapshot, None).await {
                warn!(%key, %error, "Failed to persist game log snapshot");
            }
            watch_tx.send_replace(GameWatch::Data(state));
        }
        Err(error) => {
            warn!(%key, %error, "Recompute failed, keeping last published state");
        }
    }
}

fn detach_observer(shared: &Arc<CacheShared>, key: &CollectionKey) {
    let mut entries = shared.entries.lock().unwrap();
    let Some(slot) = entries.get_mut(key) else {
        return;
    };
    slot.observers = slot.observers.saturating_sub(1);
    if slot.observers == 0 && slot.release_timer.is_none() {
        debug!(%key, "Last observer detached, arming deferred release");
        slot.release_timer = Some(spawn_release_timer(shared, key));
    }
}

fn spawn_release_timer(shared: &Arc<CacheShared>, key: &CollectionKey) -> JoinHandle<()> {
    let shared = Arc::clone(shared);
    let key = key.clone();
    tokio::spawn(async move {
        tokio::time::sleep(shared.keep_alive).await;
        let mut entries = shared.entries.lock().unwrap();
        let release = entries
            .get(&key)
            .map(|slot| slot.observers == 0)
            .unwrap_or(false);
        if release {
            if let Some(slot) = entries.remove(&key) {
                slot.listener.abort();
                info!(%key, "Cache entry released after keep-alive expiry");
            }
        }
    })
}

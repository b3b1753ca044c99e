use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::scores::error::StorageError;
use crate::scores::types::{
    EventId, EventInsert, NewScoreEvent, PlayerId, PlayerScore, ScoreTotal, VersionedScore,
};

use super::{ScoreStorage, ScoreStorageTxn};

#[derive(Clone, Debug)]
struct StoredEvent {
    id: EventId,
    player_id: PlayerId,
    delta: i64,
    source: String,
    idempotency_key: Option<String>,
}

struct Inner {
    players: HashMap<String, PlayerId>,
    usernames: HashMap<PlayerId, String>,
    events: Vec<StoredEvent>,
    tokens: HashSet<String>,
    totals: HashMap<PlayerId, ScoreTotal>,
    next_player_id: PlayerId,
    next_event_id: EventId,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            players: HashMap::new(),
            usernames: HashMap::new(),
            events: Vec::new(),
            tokens: HashSet::new(),
            totals: HashMap::new(),
            next_player_id: 1,
            next_event_id: 1,
        }
    }
}

/// Process-local system of record. Transactions are serialized: a
/// transaction owns the store lock from `begin` until commit or rollback, and
/// its writes are staged until commit.
#[derive(Clone, Default)]
pub struct InMemoryScoreStorage {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryScoreStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed ledger events.
    pub async fn event_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }

    /// Committed `(delta, source)` pairs for one player, in commit order.
    pub async fn events_for(&self, username: &str) -> Vec<(i64, String)> {
        let inner = self.inner.lock().await;
        let Some(player_id) = inner.players.get(username) else {
            return Vec::new();
        };
        inner
            .events
            .iter()
            .filter(|event| event.player_id == *player_id)
            .map(|event| (event.delta, event.source.clone()))
            .collect()
    }
}

pub struct InMemoryScoreTxn {
    guard: OwnedMutexGuard<Inner>,
    next_player_id: PlayerId,
    next_event_id: EventId,
    players: Vec<(String, PlayerId)>,
    events: Vec<StoredEvent>,
    deltas: Vec<(PlayerId, i64, EventId)>,
}

impl InMemoryScoreTxn {
    fn lookup_player(&self, username: &str) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|(name, _)| name == username)
            .map(|(_, id)| *id)
            .or_else(|| self.guard.players.get(username).copied())
    }

    fn token_taken(&self, token: &str) -> bool {
        self.guard.tokens.contains(token)
            || self
                .events
                .iter()
                .any(|event| event.idempotency_key.as_deref() == Some(token))
    }
}

#[async_trait]
impl ScoreStorage for InMemoryScoreStorage {
    async fn begin(&self) -> Result<Box<dyn ScoreStorageTxn>, StorageError> {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        Ok(Box::new(InMemoryScoreTxn {
            next_player_id: guard.next_player_id,
            next_event_id: guard.next_event_id,
            guard,
            players: Vec::new(),
            events: Vec::new(),
            deltas: Vec::new(),
        }))
    }

    async fn load_total(&self, player_id: PlayerId) -> Result<Option<ScoreTotal>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.totals.get(&player_id).copied())
    }

    async fn list_players(&self, limit: u64) -> Result<Vec<PlayerScore>, StorageError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<PlayerScore> = inner
            .usernames
            .iter()
            .map(|(id, username)| PlayerScore {
                username: username.clone(),
                score: inner.totals.get(id).map(|total| total.score).unwrap_or(0),
            })
            .collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.username.cmp(&b.username)));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn load_all_totals(&self) -> Result<Vec<VersionedScore>, StorageError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<VersionedScore> = inner
            .totals
            .iter()
            .filter_map(|(id, total)| {
                inner.usernames.get(id).map(|username| VersionedScore {
                    username: username.clone(),
                    score: total.score,
                    version: total.version,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(rows)
    }
}

#[async_trait]
impl ScoreStorageTxn for InMemoryScoreTxn {
    async fn upsert_player(&mut self, username: &str) -> Result<PlayerId, StorageError> {
        if let Some(id) = self.lookup_player(username) {
            return Ok(id);
        }
        let id = self.next_player_id;
        self.next_player_id += 1;
        self.players.push((username.to_owned(), id));
        Ok(id)
    }

    async fn insert_event(&mut self, event: NewScoreEvent) -> Result<EventInsert, StorageError> {
        let key = event.idempotency_key.filter(|key| !key.is_empty());
        if let Some(key) = key.as_deref() {
            if self.token_taken(key) {
                return Ok(EventInsert::Duplicate);
            }
        }
        let id = self.next_event_id;
        self.next_event_id += 1;
        self.events.push(StoredEvent {
            id,
            player_id: event.player_id,
            delta: event.delta,
            source: event.source,
            idempotency_key: key,
        });
        Ok(EventInsert::Applied(id))
    }

    async fn apply_delta(
        &mut self,
        player_id: PlayerId,
        delta: i64,
        event_id: EventId,
    ) -> Result<(), StorageError> {
        if !self.events.iter().any(|event| event.id == event_id) {
            return Err(StorageError::unavailable(format!(
                "event {event_id} was not staged in this transaction"
            )));
        }
        self.deltas.push((player_id, delta, event_id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let InMemoryScoreTxn {
            mut guard,
            next_player_id,
            next_event_id,
            players,
            events,
            deltas,
        } = *self;

        // Validate every aggregate before touching shared state.
        let mut staged_totals: HashMap<PlayerId, ScoreTotal> = HashMap::new();
        for (player_id, delta, event_id) in &deltas {
            let current = staged_totals
                .get(player_id)
                .copied()
                .or_else(|| guard.totals.get(player_id).copied())
                .unwrap_or_default();
            let score = current.score.checked_add(*delta).ok_or_else(|| {
                StorageError::unavailable(format!("score overflow for player {player_id}"))
            })?;
            staged_totals.insert(
                *player_id,
                ScoreTotal {
                    score,
                    version: current.version.max(*event_id),
                },
            );
        }

        guard.next_player_id = next_player_id;
        guard.next_event_id = next_event_id;
        for (username, id) in players {
            guard.usernames.insert(id, username.clone());
            guard.players.insert(username, id);
        }
        for event in events {
            if let Some(key) = event.idempotency_key.clone() {
                guard.tokens.insert(key);
            }
            guard.events.push(event);
        }
        guard.totals.extend(staged_totals);
        Ok(())
    }

    async fn rollback(self: Box<Self>) {}
}

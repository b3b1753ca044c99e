use async_trait::async_trait;

use crate::scores::error::StorageError;
use crate::scores::types::{
    EventId, EventInsert, NewScoreEvent, PlayerId, PlayerScore, ScoreTotal, VersionedScore,
};

pub mod in_memory;
pub mod sea_orm;

pub use in_memory::InMemoryScoreStorage;
pub use sea_orm::SeaOrmScoreStorage;

/// The system of record: idempotency ledger plus per-player aggregates.
#[async_trait]
pub trait ScoreStorage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ScoreStorageTxn>, StorageError>;

    /// Committed aggregate for a player. `None` until an event has been
    /// applied for them.
    async fn load_total(&self, player_id: PlayerId) -> Result<Option<ScoreTotal>, StorageError>;

    /// Players ordered by score descending, then username ascending.
    async fn list_players(&self, limit: u64) -> Result<Vec<PlayerScore>, StorageError>;

    /// Every aggregate row, used to rebuild the ranking cache.
    async fn load_all_totals(&self) -> Result<Vec<VersionedScore>, StorageError>;
}

/// One atomic unit against the system of record. Nothing is visible to other
/// readers until `commit` returns; dropping or rolling back discards it all.
#[async_trait]
pub trait ScoreStorageTxn: Send {
    /// Insert the player if missing and return its id. Concurrent callers
    /// for the same username converge on one row.
    async fn upsert_player(&mut self, username: &str) -> Result<PlayerId, StorageError>;

    /// Append an event; a repeated idempotency key is a no-op.
    async fn insert_event(&mut self, event: NewScoreEvent) -> Result<EventInsert, StorageError>;

    /// Fold an applied event into the player's aggregate.
    async fn apply_delta(
        &mut self,
        player_id: PlayerId,
        delta: i64,
        event_id: EventId,
    ) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
    async fn rollback(self: Box<Self>);
}

use async_trait::async_trait;
use serde::Serialize;

use crate::scores::EventId;

pub mod in_memory;
pub mod query;
pub mod rebuild;

pub use in_memory::InMemoryRankingCache;
pub use query::{LeaderboardQuery, RankedEntry};
pub use rebuild::{rebuild_from_storage, RebuildError, RebuildReport};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankingEntry {
    pub username: String,
    pub score: i64,
}

/// A committed total on its way into the cache. `version` is the id of the
/// last ledger event folded into `score`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankingUpdate {
    pub username: String,
    pub score: i64,
    pub version: EventId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    /// The cache already holds a newer version for this player.
    Stale,
}

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("ranking cache unavailable: {0}")]
    Unavailable(String),
}

impl RankingError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Low-latency ordering of players by score, eventually consistent with the
/// system of record.
#[async_trait]
pub trait RankingCache: Send + Sync {
    /// Replace the player's entry. Updates older than the stored version are
    /// ignored, so per-player writes can never regress.
    async fn upsert(&self, update: RankingUpdate) -> Result<UpsertOutcome, RankingError>;

    /// Up to `n` entries, score descending, ties by username ascending.
    async fn top_n(&self, n: usize) -> Result<Vec<RankingEntry>, RankingError>;

    /// 1-indexed rank and entry for a player, if cached.
    async fn rank_of(&self, username: &str)
        -> Result<Option<(usize, RankingEntry)>, RankingError>;
}

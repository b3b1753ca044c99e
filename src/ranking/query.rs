use std::sync::Arc;

use serde::Serialize;

use super::{RankingCache, RankingError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub username: String,
    pub score: i64,
}

/// Top-N read served only from the ranking cache. An unavailable cache is an
/// error here; falling back to the system of record would defeat the point.
#[derive(Clone)]
pub struct LeaderboardQuery {
    cache: Arc<dyn RankingCache>,
    max_limit: usize,
}

impl LeaderboardQuery {
    pub fn new(cache: Arc<dyn RankingCache>, max_limit: usize) -> Self {
        Self { cache, max_limit }
    }

    pub async fn execute(&self, limit: usize) -> Result<Vec<RankedEntry>, RankingError> {
        let entries = self.cache.top_n(limit.min(self.max_limit)).await?;
        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(idx, entry)| RankedEntry {
                rank: idx + 1,
                username: entry.username,
                score: entry.score,
            })
            .collect())
    }

    /// One player's current rank, or `None` if the cache has no entry.
    pub async fn standing(&self, username: &str) -> Result<Option<RankedEntry>, RankingError> {
        Ok(self
            .cache
            .rank_of(username)
            .await?
            .map(|(rank, entry)| RankedEntry {
                rank,
                username: entry.username,
                score: entry.score,
            }))
    }
}

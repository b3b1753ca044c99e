use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::scores::EventId;

use super::{RankingCache, RankingEntry, RankingError, RankingUpdate, UpsertOutcome};

type RankKey = (Reverse<i64>, String);

#[derive(Clone, Copy, Debug)]
struct Standing {
    score: i64,
    version: EventId,
}

#[derive(Default)]
struct Board {
    standings: HashMap<String, Standing>,
    ordered: BTreeSet<RankKey>,
}

/// Ordered set keyed by `(score desc, username asc)` plus a per-player index.
///
/// Writers take the lock only for the version check and a remove/insert pair.
/// Readers copy out the requested prefix under a shared lock, so a top-N read
/// never holds off writers for longer than the copy.
#[derive(Default)]
pub struct InMemoryRankingCache {
    board: RwLock<Board>,
}

impl InMemoryRankingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.board.read().standings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RankingCache for InMemoryRankingCache {
    async fn upsert(&self, update: RankingUpdate) -> Result<UpsertOutcome, RankingError> {
        let mut board = self.board.write();
        if let Some(current) = board.standings.get(&update.username).copied() {
            if update.version < current.version {
                return Ok(UpsertOutcome::Stale);
            }
            board
                .ordered
                .remove(&(Reverse(current.score), update.username.clone()));
        }
        board
            .ordered
            .insert((Reverse(update.score), update.username.clone()));
        board.standings.insert(
            update.username,
            Standing {
                score: update.score,
                version: update.version,
            },
        );
        Ok(UpsertOutcome::Applied)
    }

    async fn top_n(&self, n: usize) -> Result<Vec<RankingEntry>, RankingError> {
        let board = self.board.read();
        Ok(board
            .ordered
            .iter()
            .take(n)
            .map(|(Reverse(score), username)| RankingEntry {
                username: username.clone(),
                score: *score,
            })
            .collect())
    }

    async fn rank_of(
        &self,
        username: &str,
    ) -> Result<Option<(usize, RankingEntry)>, RankingError> {
        let board = self.board.read();
        let Some(standing) = board.standings.get(username) else {
            return Ok(None);
        };
        let key = (Reverse(standing.score), username.to_owned());
        // Linear in the rank: the ordered set keeps no subtree sizes.
        let ahead = board.ordered.range(..key).count();
        Ok(Some((
            ahead + 1,
            RankingEntry {
                username: username.to_owned(),
                score: standing.score,
            },
        )))
    }
}

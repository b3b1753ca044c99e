use tracing::info;

use crate::scores::{ScoreStorage, StorageError};

use super::{RankingCache, RankingError, RankingUpdate, UpsertOutcome};

const LOG_TARGET: &str = "leaderboard::ranking::rebuild";

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ranking(#[from] RankingError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub loaded: usize,
    pub applied: usize,
    pub stale: usize,
}

/// Reload every committed aggregate into the cache. Entries carry their
/// versions, so running this while submissions are flowing cannot roll a
/// player back.
pub async fn rebuild_from_storage(
    storage: &dyn ScoreStorage,
    cache: &dyn RankingCache,
) -> Result<RebuildReport, RebuildError> {
    let totals = storage.load_all_totals().await?;
    let mut report = RebuildReport {
        loaded: totals.len(),
        ..RebuildReport::default()
    };

    for total in totals {
        let outcome = cache
            .upsert(RankingUpdate {
                username: total.username,
                score: total.score,
                version: total.version,
            })
            .await?;
        match outcome {
            UpsertOutcome::Applied => report.applied += 1,
            UpsertOutcome::Stale => report.stale += 1,
        }
    }

    info!(
        target: LOG_TARGET,
        loaded = report.loaded,
        applied = report.applied,
        stale = report.stale,
        "ranking cache rebuilt from system of record"
    );
    Ok(report)
}

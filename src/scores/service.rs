use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::ranking::{RankingCache, RankingError, RankingUpdate, UpsertOutcome};
use crate::realtime::{BroadcastHub, LeaderboardUpdate, PublishOutcome};
use crate::tokio_tools::spawn_named_task;

use super::error::{ScoreError, StorageError};
use super::storage::{ScoreStorage, ScoreStorageTxn};
use super::types::{
    ApplyOutcome, EventInsert, NewScoreEvent, PlayerId, ScoreSubmission, SubmitOutcome,
};
use super::validation::validate_submission;

const LOG_TARGET: &str = "leaderboard::scores::ingestion";

/// Drives one submission end to end: validate, apply atomically to the
/// ledger and aggregate, read back the committed total, then propagate it to
/// the ranking cache and the broadcast hub on a best-effort basis.
#[derive(Clone)]
pub struct IngestionCoordinator {
    storage: Arc<dyn ScoreStorage>,
    ranking: Arc<dyn RankingCache>,
    hub: BroadcastHub,
    cache_timeout: Duration,
}

impl IngestionCoordinator {
    pub fn new(
        storage: Arc<dyn ScoreStorage>,
        ranking: Arc<dyn RankingCache>,
        hub: BroadcastHub,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            storage,
            ranking,
            hub,
            cache_timeout: config.cache_timeout,
        }
    }

    pub async fn submit(&self, submission: ScoreSubmission) -> Result<SubmitOutcome, ScoreError> {
        validate_submission(&submission)?;

        // The pipeline runs detached so a caller that goes away mid-request
        // cannot abort the durable unit halfway.
        let this = self.clone();
        spawn_named_task("score-submit", async move { this.run(submission).await })
            .await
            .map_err(|err| {
                ScoreError::StorageUnavailable(StorageError::unavailable(format!(
                    "submission task failed: {err}"
                )))
            })?
    }

    async fn run(&self, submission: ScoreSubmission) -> Result<SubmitOutcome, ScoreError> {
        let (player_id, outcome) = self.apply_durably(&submission).await.map_err(|err| {
            warn!(
                target: LOG_TARGET,
                username = %submission.username,
                error = %err,
                "durable apply failed"
            );
            ScoreError::StorageUnavailable(err)
        })?;

        let Some(total) = self.storage.load_total(player_id).await? else {
            // Only reachable through a duplicate token on a player that has
            // never had an event applied. There is no aggregate to rank or
            // announce.
            debug!(
                target: LOG_TARGET,
                username = %submission.username,
                ?outcome,
                "no committed total, skipping propagation"
            );
            return Ok(SubmitOutcome {
                username: submission.username,
                total: 0,
                version: 0,
                outcome,
            });
        };
        info!(
            target: LOG_TARGET,
            username = %submission.username,
            delta = submission.delta,
            source = %submission.source,
            total = total.score,
            version = total.version,
            ?outcome,
            "score submission committed"
        );

        self.propagate_to_cache(RankingUpdate {
            username: submission.username.clone(),
            score: total.score,
            version: total.version,
        })
        .await;

        if self.hub.publish(LeaderboardUpdate {
            username: submission.username.clone(),
            score: total.score,
        }) == PublishOutcome::Dropped
        {
            debug!(
                target: LOG_TARGET,
                username = %submission.username,
                "live update dropped"
            );
        }

        Ok(SubmitOutcome {
            username: submission.username,
            total: total.score,
            version: total.version,
            outcome,
        })
    }

    async fn apply_durably(
        &self,
        submission: &ScoreSubmission,
    ) -> Result<(PlayerId, ApplyOutcome), StorageError> {
        let mut txn = self.storage.begin().await?;
        match apply_in_txn(txn.as_mut(), submission).await {
            Ok(applied) => {
                txn.commit().await?;
                Ok(applied)
            }
            Err(err) => {
                txn.rollback().await;
                Err(err)
            }
        }
    }

    async fn propagate_to_cache(&self, update: RankingUpdate) {
        let username = update.username.clone();
        let result = match timeout(self.cache_timeout, self.ranking.upsert(update)).await {
            Ok(result) => result,
            Err(_) => Err(RankingError::unavailable(format!(
                "upsert timed out after {:?}",
                self.cache_timeout
            ))),
        };

        match result {
            Ok(UpsertOutcome::Applied) => {}
            Ok(UpsertOutcome::Stale) => {
                debug!(
                    target: LOG_TARGET,
                    %username,
                    "ranking cache already holds a newer total"
                );
            }
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    %username,
                    error = %err,
                    "ranking cache propagation failed"
                );
            }
        }
    }
}

async fn apply_in_txn(
    txn: &mut dyn ScoreStorageTxn,
    submission: &ScoreSubmission,
) -> Result<(PlayerId, ApplyOutcome), StorageError> {
    let player_id = txn.upsert_player(&submission.username).await?;
    let event = NewScoreEvent {
        player_id,
        delta: submission.delta,
        source: submission.source.clone(),
        idempotency_key: submission.idempotency_token().map(str::to_owned),
    };
    match txn.insert_event(event).await? {
        EventInsert::Applied(event_id) => {
            txn.apply_delta(player_id, submission.delta, event_id)
                .await?;
            Ok((player_id, ApplyOutcome::Applied))
        }
        EventInsert::Duplicate => Ok((player_id, ApplyOutcome::DuplicateSuppressed)),
    }
}

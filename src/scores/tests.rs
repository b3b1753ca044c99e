use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::{HubConfig, PipelineConfig};
use crate::db::entity::{players, score_events};
use crate::db::{connect, ensure_schema, DbSettings};
use crate::ranking::{
    rebuild_from_storage, InMemoryRankingCache, LeaderboardQuery, RankedEntry, RankingCache,
    RankingEntry, RankingError, RankingUpdate, UpsertOutcome,
};
use crate::realtime::{BroadcastHub, ChannelSink, LeaderboardUpdate};

use super::*;

fn hub() -> BroadcastHub {
    BroadcastHub::spawn(HubConfig::default(), CancellationToken::new())
}

fn coordinator_for(
    storage: Arc<dyn ScoreStorage>,
    ranking: Arc<dyn RankingCache>,
    hub: BroadcastHub,
) -> IngestionCoordinator {
    IngestionCoordinator::new(storage, ranking, hub, &PipelineConfig::default())
}

struct Pipeline {
    coordinator: IngestionCoordinator,
    storage: InMemoryScoreStorage,
    ranking: Arc<InMemoryRankingCache>,
    hub: BroadcastHub,
}

fn pipeline() -> Pipeline {
    let storage = InMemoryScoreStorage::new();
    let ranking = Arc::new(InMemoryRankingCache::new());
    let hub = hub();
    let coordinator = coordinator_for(Arc::new(storage.clone()), ranking.clone(), hub.clone());
    Pipeline {
        coordinator,
        storage,
        ranking,
        hub,
    }
}

#[derive(Clone, Copy, Debug)]
enum FailAt {
    ApplyDelta,
    Commit,
}

/// Wraps the in-memory store and fails every transaction at a chosen step
/// while `armed` is set.
struct FlakyStorage {
    inner: InMemoryScoreStorage,
    fail_at: FailAt,
    armed: Arc<AtomicBool>,
}

struct FlakyTxn {
    inner: Box<dyn ScoreStorageTxn>,
    fail_at: Option<FailAt>,
}

fn injected() -> StorageError {
    StorageError::unavailable("injected failure")
}

#[async_trait]
impl ScoreStorage for FlakyStorage {
    async fn begin(&self) -> Result<Box<dyn ScoreStorageTxn>, StorageError> {
        let inner = self.inner.begin().await?;
        let fail_at = self.armed.load(Ordering::SeqCst).then_some(self.fail_at);
        Ok(Box::new(FlakyTxn { inner, fail_at }))
    }

    async fn load_total(&self, player_id: PlayerId) -> Result<Option<ScoreTotal>, StorageError> {
        self.inner.load_total(player_id).await
    }

    async fn list_players(&self, limit: u64) -> Result<Vec<PlayerScore>, StorageError> {
        self.inner.list_players(limit).await
    }

    async fn load_all_totals(&self) -> Result<Vec<VersionedScore>, StorageError> {
        self.inner.load_all_totals().await
    }
}

#[async_trait]
impl ScoreStorageTxn for FlakyTxn {
    async fn upsert_player(&mut self, username: &str) -> Result<PlayerId, StorageError> {
        self.inner.upsert_player(username).await
    }

    async fn insert_event(&mut self, event: NewScoreEvent) -> Result<EventInsert, StorageError> {
        self.inner.insert_event(event).await
    }

    async fn apply_delta(
        &mut self,
        player_id: PlayerId,
        delta: i64,
        event_id: EventId,
    ) -> Result<(), StorageError> {
        if matches!(self.fail_at, Some(FailAt::ApplyDelta)) {
            return Err(injected());
        }
        self.inner.apply_delta(player_id, delta, event_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let FlakyTxn { inner, fail_at } = *self;
        if matches!(fail_at, Some(FailAt::Commit)) {
            inner.rollback().await;
            return Err(injected());
        }
        inner.commit().await
    }

    async fn rollback(self: Box<Self>) {
        self.inner.rollback().await;
    }
}

/// Cache that never answers within any reasonable budget.
struct HangingCache;

#[async_trait]
impl RankingCache for HangingCache {
    async fn upsert(&self, _update: RankingUpdate) -> Result<UpsertOutcome, RankingError> {
        futures::future::pending::<()>().await;
        Ok(UpsertOutcome::Applied)
    }

    async fn top_n(&self, _n: usize) -> Result<Vec<RankingEntry>, RankingError> {
        Err(RankingError::unavailable("hanging"))
    }

    async fn rank_of(
        &self,
        _username: &str,
    ) -> Result<Option<(usize, RankingEntry)>, RankingError> {
        Err(RankingError::unavailable("hanging"))
    }
}

#[tokio::test]
async fn repeated_token_applies_once() -> Result<()> {
    let p = pipeline();

    let first = p
        .coordinator
        .submit(ScoreSubmission::new("a", 10, "game"))
        .await?;
    assert_eq!(first.total, 10);
    assert_eq!(first.outcome, ApplyOutcome::Applied);

    let tokened = ScoreSubmission::new("a", 5, "game").with_idempotency("tok1");
    let second = p.coordinator.submit(tokened.clone()).await?;
    assert_eq!(second.total, 15);
    assert_eq!(second.outcome, ApplyOutcome::Applied);

    let replay = p.coordinator.submit(tokened).await?;
    assert_eq!(replay.total, 15);
    assert_eq!(replay.outcome, ApplyOutcome::DuplicateSuppressed);
    assert_eq!(replay.version, second.version);
    assert_eq!(
        p.storage.events_for("a").await,
        vec![(10, "game".to_owned()), (5, "game".to_owned())]
    );

    let top = LeaderboardQuery::new(p.ranking.clone(), 1000)
        .execute(1)
        .await?;
    assert_eq!(
        top,
        vec![RankedEntry {
            rank: 1,
            username: "a".into(),
            score: 15
        }]
    );
    Ok(())
}

#[tokio::test]
async fn submissions_without_token_always_apply() -> Result<()> {
    let p = pipeline();
    for submission in [
        ScoreSubmission::new("bob", 3, "game"),
        ScoreSubmission::new("bob", 3, "game"),
        ScoreSubmission::new("bob", 3, "game").with_idempotency(""),
        ScoreSubmission::new("bob", 3, "game").with_idempotency(""),
    ] {
        let outcome = p.coordinator.submit(submission).await?;
        assert_eq!(outcome.outcome, ApplyOutcome::Applied);
    }

    assert_eq!(p.storage.event_count().await, 4);
    assert_eq!(
        p.storage.list_players(10).await?,
        vec![PlayerScore {
            username: "bob".into(),
            score: 12
        }]
    );
    Ok(())
}

#[tokio::test]
async fn token_is_global_across_players() -> Result<()> {
    let p = pipeline();
    p.coordinator
        .submit(ScoreSubmission::new("alice", 8, "game").with_idempotency("shared"))
        .await?;

    let other = p
        .coordinator
        .submit(ScoreSubmission::new("bob", 4, "game").with_idempotency("shared"))
        .await?;
    assert_eq!(other.outcome, ApplyOutcome::DuplicateSuppressed);
    assert_eq!(other.total, 0);
    assert_eq!(p.storage.event_count().await, 1);

    // bob has no aggregate, so nothing about him may reach the cache or the
    // hub; the live cache must match one rebuilt from storage.
    let fresh = InMemoryRankingCache::new();
    rebuild_from_storage(&p.storage, &fresh).await?;
    assert_eq!(p.ranking.top_n(10).await?, fresh.top_n(10).await?);
    assert!(p.ranking.rank_of("bob").await?.is_none());
    assert_eq!(p.hub.published(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_submission_has_no_side_effects() {
    let p = pipeline();
    let result = p
        .coordinator
        .submit(ScoreSubmission::new("alice", 0, "game"))
        .await;

    assert!(matches!(result, Err(ScoreError::InvalidArgument(_))));
    assert_eq!(p.storage.event_count().await, 0);
    assert!(p.storage.list_players(10).await.unwrap().is_empty());
    assert_eq!(p.hub.published(), 0);
}

#[tokio::test]
async fn failed_unit_leaves_nothing_behind() -> Result<()> {
    for fail_at in [FailAt::ApplyDelta, FailAt::Commit] {
        let inner = InMemoryScoreStorage::new();
        let armed = Arc::new(AtomicBool::new(false));
        let storage = Arc::new(FlakyStorage {
            inner: inner.clone(),
            fail_at,
            armed: armed.clone(),
        });
        let ranking = Arc::new(InMemoryRankingCache::new());
        let hub = hub();
        let coordinator = coordinator_for(storage, ranking.clone(), hub.clone());

        coordinator
            .submit(ScoreSubmission::new("carol", 10, "game"))
            .await?;

        armed.store(true, Ordering::SeqCst);
        let retry = ScoreSubmission::new("carol", 5, "game").with_idempotency("retry-me");
        let failed = coordinator.submit(retry.clone()).await;
        assert!(
            matches!(failed, Err(ScoreError::StorageUnavailable(_))),
            "{fail_at:?}"
        );
        assert_eq!(inner.event_count().await, 1);
        assert_eq!(inner.list_players(10).await?[0].score, 10);
        assert_eq!(ranking.rank_of("carol").await?.map(|(_, e)| e.score), Some(10));
        assert_eq!(hub.published(), 1);

        // The token was never recorded, so the retry goes through exactly once.
        armed.store(false, Ordering::SeqCst);
        let applied = coordinator.submit(retry.clone()).await?;
        assert_eq!(applied.outcome, ApplyOutcome::Applied);
        assert_eq!(applied.total, 15);
        let again = coordinator.submit(retry).await?;
        assert_eq!(again.outcome, ApplyOutcome::DuplicateSuppressed);
        assert_eq!(inner.event_count().await, 2);
    }
    Ok(())
}

#[tokio::test]
async fn abandoned_submission_still_completes_its_unit() -> Result<()> {
    let p = pipeline();
    let submission = ScoreSubmission::new("frank", 6, "game").with_idempotency("gone-early");

    // Poll once so the submission is under way, then drop it the way a
    // disconnecting client's request future is dropped.
    let abandoned = p.coordinator.submit(submission.clone()).now_or_never();
    assert!(abandoned.is_none());

    let storage = p.storage.clone();
    timeout(Duration::from_secs(2), async {
        while storage.event_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    let ranking = p.ranking.clone();
    timeout(Duration::from_secs(2), async {
        while ranking.rank_of("frank").await.ok().flatten().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    assert_eq!(p.storage.event_count().await, 1);
    assert_eq!(
        p.storage.list_players(10).await?,
        vec![PlayerScore {
            username: "frank".into(),
            score: 6
        }]
    );
    let (_, entry) = p.ranking.rank_of("frank").await?.expect("cached");
    assert_eq!(entry.score, 6);

    // A retry after the abandoned call is recognised as already applied.
    let retry = p.coordinator.submit(submission).await?;
    assert_eq!(retry.outcome, ApplyOutcome::DuplicateSuppressed);
    assert_eq!(retry.total, 6);
    Ok(())
}

#[tokio::test]
async fn unresponsive_cache_does_not_fail_submission() -> Result<()> {
    let storage = InMemoryScoreStorage::new();
    let config = PipelineConfig {
        cache_timeout: Duration::from_millis(50),
        ..PipelineConfig::default()
    };
    let coordinator =
        IngestionCoordinator::new(Arc::new(storage.clone()), Arc::new(HangingCache), hub(), &config);

    let started = Instant::now();
    let outcome = timeout(
        Duration::from_secs(5),
        coordinator.submit(ScoreSubmission::new("dave", 9, "game")),
    )
    .await??;
    assert_eq!(outcome.total, 9);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(storage.event_count().await, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_submissions_share_one_player() -> Result<()> {
    let p = pipeline();
    let mut handles = Vec::new();
    for n in 0..20 {
        let coordinator = p.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .submit(ScoreSubmission::new("newbie", 1, format!("game-{n}")))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(
        p.storage.list_players(10).await?,
        vec![PlayerScore {
            username: "newbie".into(),
            score: 20
        }]
    );
    // Propagations raced, but the cache settles on the newest total.
    let (rank, entry) = p.ranking.rank_of("newbie").await?.expect("cached");
    assert_eq!((rank, entry.score), (1, 20));
    Ok(())
}

#[tokio::test]
async fn committed_totals_reach_subscribers() -> Result<()> {
    let p = pipeline();
    let (sink, mut frames) = ChannelSink::pair(8);
    p.hub.register(sink);

    p.coordinator
        .submit(ScoreSubmission::new("erin", 4, "game"))
        .await?;
    p.coordinator
        .submit(ScoreSubmission::new("erin", -1, "penalty"))
        .await?;

    for expected in [4, 3] {
        let frame = timeout(Duration::from_secs(2), frames.recv())
            .await?
            .expect("sink open");
        let update: LeaderboardUpdate = serde_json::from_str(&frame)?;
        assert_eq!(update.username, "erin");
        assert_eq!(update.score, expected);
    }
    Ok(())
}

#[tokio::test]
async fn rebuild_restores_cache_from_storage() -> Result<()> {
    let p = pipeline();
    for (name, delta) in [("x", 7), ("y", 12), ("z", 7), ("x", 1)] {
        p.coordinator
            .submit(ScoreSubmission::new(name, delta, "game"))
            .await?;
    }

    let fresh = InMemoryRankingCache::new();
    let report = rebuild_from_storage(&p.storage, &fresh).await?;
    assert_eq!(report.loaded, 3);
    assert_eq!(report.applied, 3);

    let rebuilt = fresh.top_n(10).await?;
    let live = p.ranking.top_n(10).await?;
    assert_eq!(rebuilt, live);
    assert_eq!(rebuilt[0].username, "y");
    Ok(())
}

async fn connect_test_db() -> Result<Option<DatabaseConnection>> {
    let Ok(url) = env::var("TEST_DATABASE_URL").or_else(|_| env::var("DATABASE_URL")) else {
        eprintln!("skipping sea-orm score test: TEST_DATABASE_URL/DATABASE_URL not set");
        return Ok(None);
    };
    let conn = match connect(&DbSettings::new(url)).await {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("skipping sea-orm score test: failed to connect to postgres ({err})");
            return Ok(None);
        }
    };
    if let Err(err) = conn.ping().await {
        eprintln!("skipping sea-orm score test: ping postgres failed ({err})");
        return Ok(None);
    }
    ensure_schema(&conn).await?;
    Ok(Some(conn))
}

#[tokio::test]
async fn sea_orm_storage_applies_once_per_token() -> Result<()> {
    let Some(conn) = connect_test_db().await? else {
        return Ok(());
    };
    let storage = Arc::new(SeaOrmScoreStorage::new(conn.clone()));
    let ranking = Arc::new(InMemoryRankingCache::new());
    let coordinator = coordinator_for(storage.clone(), ranking.clone(), hub());

    let suffix = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let username = format!("it-player-{suffix}");
    let token = format!("it-token-{suffix}");

    let first = coordinator
        .submit(ScoreSubmission::new(&username, 10, "game"))
        .await?;
    assert_eq!(first.total, 10);

    let tokened = ScoreSubmission::new(&username, 5, "game").with_idempotency(&token);
    let second = coordinator.submit(tokened.clone()).await?;
    assert_eq!((second.total, second.outcome), (15, ApplyOutcome::Applied));
    assert!(second.version > first.version);

    let replay = coordinator.submit(tokened).await?;
    assert_eq!(
        (replay.total, replay.outcome),
        (15, ApplyOutcome::DuplicateSuppressed)
    );
    assert_eq!(replay.version, second.version);

    let player = players::Entity::find()
        .filter(players::Column::Username.eq(username.as_str()))
        .one(&conn)
        .await?
        .expect("player row");
    let events = score_events::Entity::find()
        .filter(score_events::Column::PlayerId.eq(player.id))
        .count(&conn)
        .await?;
    assert_eq!(events, 2);

    let fresh = InMemoryRankingCache::new();
    rebuild_from_storage(storage.as_ref(), &fresh).await?;
    let (_, entry) = fresh.rank_of(&username).await?.expect("rebuilt entry");
    assert_eq!(entry.score, 15);
    Ok(())
}

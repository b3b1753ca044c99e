use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, EntityTrait,
    FromQueryResult, Statement, TransactionTrait,
};
use tracing::debug;

use crate::db::entity::player_scores;
use crate::scores::error::StorageError;
use crate::scores::types::{
    EventId, EventInsert, NewScoreEvent, PlayerId, PlayerScore, ScoreTotal, VersionedScore,
};

use super::{ScoreStorage, ScoreStorageTxn};

const LOG_TARGET: &str = "leaderboard::scores::storage";

// The no-op update makes RETURNING yield the existing id on conflict, and it
// row-locks the player until commit. Every later statement in the unit,
// including drawing the event id, is therefore serialized per player, so
// event ids (the cache versions) grow in per-player commit order. Keep the
// DO UPDATE; DO NOTHING would take no lock.
const UPSERT_PLAYER_SQL: &str = "INSERT INTO players (username) VALUES ($1) \
     ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username \
     RETURNING id";

const INSERT_EVENT_SQL: &str = "INSERT INTO score_events (player_id, delta, source, idempotency_key) \
     VALUES ($1, $2, $3, $4) \
     ON CONFLICT (idempotency_key) DO NOTHING \
     RETURNING id";

const APPLY_DELTA_SQL: &str = "INSERT INTO player_scores (player_id, score, last_event_id) \
     VALUES ($1, $2, $3) \
     ON CONFLICT (player_id) DO UPDATE SET \
        score = player_scores.score + EXCLUDED.score, \
        last_event_id = GREATEST(player_scores.last_event_id, EXCLUDED.last_event_id), \
        updated_at = now()";

const LIST_PLAYERS_SQL: &str = "SELECT p.username, COALESCE(ps.score, 0) AS score \
     FROM players p \
     LEFT JOIN player_scores ps ON ps.player_id = p.id \
     ORDER BY score DESC, p.username ASC \
     LIMIT $1";

const LOAD_ALL_TOTALS_SQL: &str = "SELECT p.username, ps.score, ps.last_event_id AS version \
     FROM player_scores ps \
     JOIN players p ON p.id = ps.player_id \
     ORDER BY p.username ASC";

#[derive(Debug, FromQueryResult)]
struct IdRow {
    id: i64,
}

#[derive(Debug, FromQueryResult)]
struct PlayerScoreRow {
    username: String,
    score: i64,
}

#[derive(Debug, FromQueryResult)]
struct VersionedScoreRow {
    username: String,
    score: i64,
    version: i64,
}

pub struct SeaOrmScoreStorage {
    connection: DatabaseConnection,
}

impl SeaOrmScoreStorage {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

pub struct SeaOrmScoreTxn {
    txn: DatabaseTransaction,
}

#[async_trait]
impl ScoreStorage for SeaOrmScoreStorage {
    async fn begin(&self) -> Result<Box<dyn ScoreStorageTxn>, StorageError> {
        let txn = self.connection.begin().await?;
        Ok(Box::new(SeaOrmScoreTxn { txn }))
    }

    async fn load_total(&self, player_id: PlayerId) -> Result<Option<ScoreTotal>, StorageError> {
        let row = player_scores::Entity::find_by_id(player_id)
            .one(&self.connection)
            .await?;
        Ok(row.map(|model| ScoreTotal {
            score: model.score,
            version: model.last_event_id,
        }))
    }

    async fn list_players(&self, limit: u64) -> Result<Vec<PlayerScore>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = PlayerScoreRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            LIST_PLAYERS_SQL,
            [limit.into()],
        ))
        .all(&self.connection)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| PlayerScore {
                username: row.username,
                score: row.score,
            })
            .collect())
    }

    async fn load_all_totals(&self) -> Result<Vec<VersionedScore>, StorageError> {
        let rows = VersionedScoreRow::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            LOAD_ALL_TOTALS_SQL,
        ))
        .all(&self.connection)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| VersionedScore {
                username: row.username,
                score: row.score,
                version: row.version,
            })
            .collect())
    }
}

#[async_trait]
impl ScoreStorageTxn for SeaOrmScoreTxn {
    async fn upsert_player(&mut self, username: &str) -> Result<PlayerId, StorageError> {
        let row = IdRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            UPSERT_PLAYER_SQL,
            [username.to_owned().into()],
        ))
        .one(&self.txn)
        .await?
        .ok_or_else(|| StorageError::unavailable("player upsert returned no id"))?;
        Ok(row.id)
    }

    async fn insert_event(&mut self, event: NewScoreEvent) -> Result<EventInsert, StorageError> {
        let key = event.idempotency_key.filter(|key| !key.is_empty());
        let row = IdRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            INSERT_EVENT_SQL,
            [
                event.player_id.into(),
                event.delta.into(),
                event.source.into(),
                key.clone().into(),
            ],
        ))
        .one(&self.txn)
        .await?;

        match row {
            Some(row) => Ok(EventInsert::Applied(row.id)),
            None => {
                debug!(
                    target: LOG_TARGET,
                    player_id = event.player_id,
                    idempotency_key = ?key,
                    "idempotency key already applied"
                );
                Ok(EventInsert::Duplicate)
            }
        }
    }

    async fn apply_delta(
        &mut self,
        player_id: PlayerId,
        delta: i64,
        event_id: EventId,
    ) -> Result<(), StorageError> {
        self.txn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                APPLY_DELTA_SQL,
                [player_id.into(), delta.into(), event_id.into()],
            ))
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        let _ = self.txn.rollback().await;
    }
}

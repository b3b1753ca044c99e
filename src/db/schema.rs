use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, Statement};
use tracing::info;

const LOG_TARGET: &str = "leaderboard::db::schema";

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS players (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS score_events (
        id BIGSERIAL PRIMARY KEY,
        player_id BIGINT NOT NULL REFERENCES players(id) ON DELETE CASCADE,
        delta BIGINT NOT NULL CHECK (delta <> 0),
        source TEXT NOT NULL,
        idempotency_key TEXT UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS score_events_player_id_idx ON score_events(player_id)",
    "CREATE TABLE IF NOT EXISTS player_scores (
        player_id BIGINT PRIMARY KEY REFERENCES players(id) ON DELETE CASCADE,
        score BIGINT NOT NULL DEFAULT 0,
        last_event_id BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS player_scores_score_idx ON player_scores(score DESC)",
];

/// Create the ledger and aggregate tables if they are missing.
pub async fn ensure_schema(conn: &DatabaseConnection) -> Result<(), DbErr> {
    for sql in SCHEMA_STATEMENTS {
        conn.execute(Statement::from_string(DbBackend::Postgres, *sql))
            .await?;
    }
    info!(target: LOG_TARGET, tables = 3, "schema ensured");
    Ok(())
}

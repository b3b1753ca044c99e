use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{HubConfig, PipelineConfig};
use crate::db::{connect, ensure_schema, DbSettings};
use crate::ranking::{rebuild_from_storage, InMemoryRankingCache, RankingCache};
use crate::realtime::BroadcastHub;
use crate::scores::{ScoreStorage, SeaOrmScoreStorage};

use super::routes::{AppContext, LeaderboardServer};

const LOG_TARGET: &str = "leaderboard::server::bootstrap";

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub db: DbSettings,
    pub hub: HubConfig,
    pub pipeline: PipelineConfig,
    /// Reload the ranking cache from the system of record before serving.
    pub rebuild_cache: bool,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let db = connect(&config.db).await?;
    ensure_schema(&db)
        .await
        .context("failed to apply database schema")?;

    let storage: Arc<dyn ScoreStorage> = Arc::new(SeaOrmScoreStorage::new(db));
    let ranking: Arc<dyn RankingCache> = Arc::new(InMemoryRankingCache::new());
    if config.rebuild_cache {
        rebuild_from_storage(storage.as_ref(), ranking.as_ref())
            .await
            .context("failed to rebuild ranking cache")?;
    } else {
        warn!(target: LOG_TARGET, "ranking cache starts empty");
    }

    let shutdown = CancellationToken::new();
    let hub = BroadcastHub::spawn(config.hub.clone(), shutdown.clone());
    let context = Arc::new(AppContext::new(storage, ranking, hub, &config.pipeline));
    let router = LeaderboardServer::new(context).into_router();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(
        target: LOG_TARGET,
        %local_addr,
        broadcast_capacity = config.hub.broadcast_capacity,
        "leaderboard server listening"
    );

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;
    shutdown.cancel();
    served.context("server exited with error")
}

/// Resolves on ctrl-c. Cancelling the hub here closes live websocket
/// subscribers so graceful shutdown does not wait on them.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target: LOG_TARGET,
            error = %err,
            "failed to install ctrl-c handler"
        );
    }
    info!(target: LOG_TARGET, "shutdown signal received");
    shutdown.cancel();
}

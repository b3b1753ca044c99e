use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::middleware;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::config::PipelineConfig;
use crate::ranking::{LeaderboardQuery, RankingCache};
use crate::realtime::BroadcastHub;
use crate::scores::{IngestionCoordinator, PlayersQuery, ScoreStorage};

use super::dto::{LeaderboardRow, PlayerRow, ScoreRequest, ScoreResponse};
use super::error::ApiError;
use super::logging::log_requests;
use super::ws::ws_handler;

/// Everything the handlers need, shared through an `Extension`.
pub struct AppContext {
    pub coordinator: IngestionCoordinator,
    pub leaderboard: LeaderboardQuery,
    pub players: PlayersQuery,
    pub hub: BroadcastHub,
    pub default_limit: usize,
}

impl AppContext {
    pub fn new(
        storage: Arc<dyn ScoreStorage>,
        ranking: Arc<dyn RankingCache>,
        hub: BroadcastHub,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            coordinator: IngestionCoordinator::new(
                Arc::clone(&storage),
                Arc::clone(&ranking),
                hub.clone(),
                config,
            ),
            leaderboard: LeaderboardQuery::new(ranking, config.max_leaderboard_limit),
            players: PlayersQuery::new(storage, config.players_page_size),
            hub,
            default_limit: config.default_leaderboard_limit,
        }
    }
}

pub struct LeaderboardServer {
    router: Router,
}

impl LeaderboardServer {
    pub fn new(context: Arc<AppContext>) -> Self {
        let router = Router::new()
            .route("/healthz", get(healthz))
            .route("/players", get(list_players))
            .route("/score", post(submit_score))
            .route("/leaderboard", get(get_leaderboard))
            .route("/leaderboard/:username", get(get_standing))
            .route("/ws", get(ws_handler))
            .layer(Extension(context))
            .layer(middleware::from_fn(log_requests))
            .layer(CorsLayer::permissive());

        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

#[derive(Debug, Default, Deserialize)]
struct LeaderboardParams {
    limit: Option<usize>,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_players(
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Result<Json<Vec<PlayerRow>>, ApiError> {
    let players = ctx.players.execute().await?;
    Ok(Json(players.into_iter().map(PlayerRow::from).collect()))
}

async fn submit_score(
    Extension(ctx): Extension<Arc<AppContext>>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let Json(request) = payload.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let outcome = ctx.coordinator.submit(request.into()).await?;
    Ok(Json(outcome.into()))
}

async fn get_leaderboard(
    Extension(ctx): Extension<Arc<AppContext>>,
    params: Result<Query<LeaderboardParams>, QueryRejection>,
) -> Result<Json<Vec<LeaderboardRow>>, ApiError> {
    let Query(params) = params.map_err(|err| ApiError::bad_request(err.body_text()))?;
    let limit = params.limit.unwrap_or(ctx.default_limit);
    let rows = ctx.leaderboard.execute(limit).await?;
    Ok(Json(rows.into_iter().map(LeaderboardRow::from).collect()))
}

async fn get_standing(
    Extension(ctx): Extension<Arc<AppContext>>,
    Path(username): Path<String>,
) -> Result<Json<LeaderboardRow>, ApiError> {
    let entry = ctx
        .leaderboard
        .standing(&username)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{username} is not ranked")))?;
    Ok(Json(entry.into()))
}

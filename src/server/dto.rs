use serde::{Deserialize, Serialize};

use crate::ranking::RankedEntry;
use crate::scores::{PlayerScore, ScoreSubmission, SubmitOutcome};

/// Body of `POST /score`. Missing fields deserialize to their zero values and
/// are rejected by validation, not by the JSON extractor.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScoreRequest {
    pub username: String,
    pub delta: i64,
    pub source: String,
    pub idempotency: Option<String>,
}

impl From<ScoreRequest> for ScoreSubmission {
    fn from(request: ScoreRequest) -> Self {
        Self {
            username: request.username,
            delta: request.delta,
            source: request.source,
            idempotency: request.idempotency,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub username: String,
    pub score: i64,
}

impl From<SubmitOutcome> for ScoreResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            username: outcome.username,
            score: outcome.total,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub username: String,
    pub score: i64,
}

impl From<RankedEntry> for LeaderboardRow {
    fn from(entry: RankedEntry) -> Self {
        Self {
            rank: entry.rank,
            username: entry.username,
            score: entry.score,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRow {
    pub username: String,
    pub score: i64,
}

impl From<PlayerScore> for PlayerRow {
    fn from(player: PlayerScore) -> Self {
        Self {
            username: player.username,
            score: player.score,
        }
    }
}

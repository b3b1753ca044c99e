use serde::{Deserialize, Serialize};

pub type PlayerId = i64;
pub type EventId = i64;

/// A score delta as submitted by a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ScoreSubmission {
    pub username: String,
    pub delta: i64,
    pub source: String,
    pub idempotency: Option<String>,
}

impl ScoreSubmission {
    pub fn new(username: impl Into<String>, delta: i64, source: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            delta,
            source: source.into(),
            idempotency: None,
        }
    }

    pub fn with_idempotency(mut self, token: impl Into<String>) -> Self {
        self.idempotency = Some(token.into());
        self
    }

    /// The deduplication token, if one was supplied. Empty tokens count as
    /// absent and never collide.
    pub fn idempotency_token(&self) -> Option<&str> {
        self.idempotency.as_deref().filter(|token| !token.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewScoreEvent {
    pub player_id: PlayerId,
    pub delta: i64,
    pub source: String,
    pub idempotency_key: Option<String>,
}

/// Result of appending an event to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventInsert {
    Applied(EventId),
    Duplicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    DuplicateSuppressed,
}

/// A player's aggregate together with the id of the last event folded into
/// it. The version only grows, in commit order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScoreTotal {
    pub score: i64,
    pub version: EventId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub username: String,
    pub score: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedScore {
    pub username: String,
    pub score: i64,
    pub version: EventId,
}

/// What a successful submission reports back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub username: String,
    pub total: i64,
    pub version: EventId,
    pub outcome: ApplyOutcome,
}

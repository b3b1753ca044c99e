use sea_orm::DbErr;

/// Failures of the system of record.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Outcome of a rejected submission. A repeated idempotency token is not an
/// error; see [`crate::scores::ApplyOutcome::DuplicateSuppressed`].
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The durable unit did not commit. Retrying with the same idempotency
    /// token is safe.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
}

impl ScoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

pub mod error;
pub mod query;
pub mod service;
pub mod storage;
pub mod types;
pub mod validation;

#[cfg(test)]
mod tests;

pub use error::{ScoreError, StorageError};
pub use query::PlayersQuery;
pub use service::IngestionCoordinator;
pub use storage::{InMemoryScoreStorage, ScoreStorage, ScoreStorageTxn, SeaOrmScoreStorage};
pub use types::*;
pub use validation::validate_submission;

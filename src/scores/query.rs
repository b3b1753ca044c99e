use std::sync::Arc;

use super::error::StorageError;
use super::storage::ScoreStorage;
use super::types::PlayerScore;

/// Listing of players straight from the system of record.
#[derive(Clone)]
pub struct PlayersQuery {
    storage: Arc<dyn ScoreStorage>,
    page_size: u64,
}

impl PlayersQuery {
    pub fn new(storage: Arc<dyn ScoreStorage>, page_size: u64) -> Self {
        Self { storage, page_size }
    }

    pub async fn execute(&self) -> Result<Vec<PlayerScore>, StorageError> {
        self.storage.list_players(self.page_size).await
    }
}

use std::time::Duration;

/// Default capacity of the hub's shared publish queue.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 128;
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 32;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
pub const MAX_LEADERBOARD_LIMIT: usize = 1000;
pub const DEFAULT_PLAYERS_PAGE_SIZE: u64 = 50;

/// Tunables for the broadcast hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bound on updates waiting for the dispatch loop. Publishing into a full
    /// queue drops the update.
    pub broadcast_capacity: usize,
    /// Bound on updates waiting for a single subscriber's writer.
    pub subscriber_queue: usize,
    /// A subscriber whose write takes longer than this is evicted.
    pub write_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Tunables for the ingestion and read paths.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache_timeout: Duration,
    pub default_leaderboard_limit: usize,
    pub max_leaderboard_limit: usize,
    pub players_page_size: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_timeout: Duration::from_millis(500),
            default_leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
            max_leaderboard_limit: MAX_LEADERBOARD_LIMIT,
            players_page_size: DEFAULT_PLAYERS_PAGE_SIZE,
        }
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

pub mod entity;
pub mod schema;

pub use schema::ensure_schema;

/// Pool settings for the system of record.
#[derive(Debug, Clone)]
pub struct DbSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub sqlx_logging: bool,
}

impl DbSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
            sqlx_logging: false,
        }
    }
}

pub async fn connect(settings: &DbSettings) -> Result<DatabaseConnection> {
    let mut opts = ConnectOptions::new(settings.url.clone());
    opts.max_connections(settings.max_connections)
        .min_connections(1)
        .connect_timeout(settings.connect_timeout)
        .sqlx_logging(settings.sqlx_logging);
    Database::connect(opts)
        .await
        .with_context(|| format!("failed to connect to database at {}", settings.url))
}

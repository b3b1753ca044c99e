use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use leaderboard::config::{
    HubConfig, PipelineConfig, DEFAULT_BROADCAST_CAPACITY, DEFAULT_LEADERBOARD_LIMIT,
    DEFAULT_PLAYERS_PAGE_SIZE, DEFAULT_SUBSCRIBER_QUEUE, MAX_LEADERBOARD_LIMIT,
};
use leaderboard::db::DbSettings;
use leaderboard::server::{run_server, ServerConfig};

const LOG_TARGET: &str = "bin::leaderboard_server";
const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Debug, Parser)]
#[command(name = "leaderboard_server")]
#[command(about = "Score ingestion and live leaderboard API server", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "LEADERBOARD_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// SeaORM-compatible Postgres URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Upper bound on pooled database connections
    #[arg(long, env = "LEADERBOARD_DB_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Updates the broadcast hub may hold before dropping new ones
    #[arg(long, env = "LEADERBOARD_BROADCAST_CAPACITY", default_value_t = DEFAULT_BROADCAST_CAPACITY)]
    broadcast_capacity: usize,

    /// Updates a single subscriber may have pending before it starts losing them
    #[arg(long, env = "LEADERBOARD_SUBSCRIBER_QUEUE", default_value_t = DEFAULT_SUBSCRIBER_QUEUE)]
    subscriber_queue: usize,

    /// Subscribers slower than this on a single write are disconnected
    #[arg(long, env = "LEADERBOARD_SUBSCRIBER_WRITE_TIMEOUT_MS", default_value_t = 5_000)]
    subscriber_write_timeout_ms: u64,

    /// Budget for one ranking cache update on the write path
    #[arg(long, env = "LEADERBOARD_CACHE_TIMEOUT_MS", default_value_t = 500)]
    cache_timeout_ms: u64,

    /// Rows returned by GET /players
    #[arg(long, env = "LEADERBOARD_PLAYERS_PAGE_SIZE", default_value_t = DEFAULT_PLAYERS_PAGE_SIZE)]
    players_page_size: u64,

    /// Start with an empty ranking cache instead of loading it from Postgres
    #[arg(long, env = "LEADERBOARD_SKIP_CACHE_REBUILD", default_value_t = false)]
    skip_cache_rebuild: bool,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "LEADERBOARD_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    let config = build_config(args);
    info!(target: LOG_TARGET, bind = %config.bind, "starting leaderboard server");
    run_server(config).await.context("leaderboard server failed")
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(true);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn build_config(args: Args) -> ServerConfig {
    let mut db = DbSettings::new(args.database_url);
    db.max_connections = args.max_connections;

    ServerConfig {
        bind: args.bind,
        db,
        hub: HubConfig {
            broadcast_capacity: args.broadcast_capacity,
            subscriber_queue: args.subscriber_queue,
            write_timeout: Duration::from_millis(args.subscriber_write_timeout_ms),
        },
        pipeline: PipelineConfig {
            cache_timeout: Duration::from_millis(args.cache_timeout_ms),
            default_leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
            max_leaderboard_limit: MAX_LEADERBOARD_LIMIT,
            players_page_size: args.players_page_size,
        },
        rebuild_cache: !args.skip_cache_rebuild,
    }
}

mod bootstrap;
pub mod dto;
mod error;
mod logging;
mod routes;
mod ws;


pub use bootstrap::{run_server, ServerConfig};
pub use error::ApiError;
pub use logging::log_requests;
pub use routes::{AppContext, LeaderboardServer};

pub mod config;
pub mod db;
pub mod ranking;
pub mod realtime;
pub mod scores;
pub mod server;
pub mod tokio_tools;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Outbound half of a live connection.
#[async_trait]
pub trait SubscriberSink: Send + 'static {
    async fn send_frame(&mut self, frame: String) -> Result<(), SinkError>;

    /// Release the underlying connection. Called once, after the writer stops.
    async fn close(&mut self) {}
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("write failed: {0}")]
    Write(String),
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Sink that forwards frames into a bounded channel, for in-process
/// consumers.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    pub fn pair(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl SubscriberSink for ChannelSink {
    async fn send_frame(&mut self, frame: String) -> Result<(), SinkError> {
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }
}

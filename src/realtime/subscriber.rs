use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::hub::{EvictReason, HubShared, SubscriberId};
use super::sink::{SinkError, SubscriberSink};
use super::LeaderboardUpdate;

const LOG_TARGET: &str = "leaderboard::realtime::subscriber";

/// The hub's view of a live subscriber: its outbound queue and the token that
/// stops its writer.
pub(crate) struct SubscriberHandle {
    pub(crate) outbound: mpsc::Sender<LeaderboardUpdate>,
    pub(crate) cancel: CancellationToken,
    pub(crate) dropped: AtomicU64,
}

impl SubscriberHandle {
    pub(crate) fn new(outbound: mpsc::Sender<LeaderboardUpdate>, cancel: CancellationToken) -> Self {
        Self {
            outbound,
            cancel,
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Dedicated writer for one subscriber. Drains the subscriber's queue in
/// order; the first failed or timed out write evicts the subscriber.
pub(crate) async fn run_writer<S>(
    id: SubscriberId,
    mut sink: S,
    mut outbound: mpsc::Receiver<LeaderboardUpdate>,
    cancel: CancellationToken,
    hub: Weak<HubShared>,
    write_timeout: Duration,
) where
    S: SubscriberSink,
{
    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = outbound.recv() => match next {
                Some(update) => update,
                None => break,
            },
        };

        let frame = match serde_json::to_string(&update) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(target: LOG_TARGET, subscriber = id, error = %err, "failed to encode update");
                continue;
            }
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            written = timeout(write_timeout, sink.send_frame(frame)) => written,
        };

        let failure = match written {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err,
            Err(_) => SinkError::Timeout(write_timeout),
        };

        warn!(
            target: LOG_TARGET,
            subscriber = id,
            error = %failure,
            "delivery failed, evicting subscriber"
        );
        if let Some(hub) = hub.upgrade() {
            hub.evict(id, EvictReason::DeliveryFailed);
        }
        break;
    }

    if timeout(write_timeout, sink.close()).await.is_err() {
        debug!(target: LOG_TARGET, subscriber = id, "close timed out");
    }
    debug!(target: LOG_TARGET, subscriber = id, "writer stopped");
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::tokio_tools::spawn_named_task;

use super::sink::SubscriberSink;
use super::subscriber::{run_writer, SubscriberHandle};
use super::LeaderboardUpdate;

const LOG_TARGET: &str = "leaderboard::realtime::hub";

pub type SubscriberId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    /// The hub queue was full (or the hub is stopped); the update is gone.
    Dropped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EvictReason {
    Unregistered,
    DeliveryFailed,
    Shutdown,
}

/// A registered subscriber. `closed` fires when the hub lets go of it, for
/// whatever reason, so the connection's read side can stop too.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub closed: CancellationToken,
}

pub(crate) struct HubShared {
    subscribers: DashMap<SubscriberId, SubscriberHandle>,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    config: HubConfig,
    shutdown: CancellationToken,
}

impl HubShared {
    pub(crate) fn evict(&self, id: SubscriberId, reason: EvictReason) -> bool {
        match self.subscribers.remove(&id) {
            Some((_, handle)) => {
                handle.cancel.cancel();
                info!(
                    target: LOG_TARGET,
                    subscriber = id,
                    ?reason,
                    dropped = handle.dropped.load(Ordering::Relaxed),
                    remaining = self.subscribers.len(),
                    "subscriber removed"
                );
                true
            }
            None => false,
        }
    }

    fn fan_out(&self, update: &LeaderboardUpdate) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().outbound.try_send(update.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = entry.value().record_drop();
                    debug!(
                        target: LOG_TARGET,
                        subscriber = *entry.key(),
                        dropped,
                        "subscriber queue full, dropping update"
                    );
                }
                Err(TrySendError::Closed(_)) => dead.push(*entry.key()),
            }
        }
        // Removal takes the shard write lock, so it must wait until the
        // iteration above has released its read guards.
        for id in dead {
            self.evict(id, EvictReason::DeliveryFailed);
        }
    }

    fn close_all(&self) {
        let ids: Vec<SubscriberId> = self.subscribers.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.evict(id, EvictReason::Shutdown);
        }
    }
}

/// Fans leaderboard updates out to live subscribers.
///
/// `publish` is a non-blocking `try_send` into a queue bounded by
/// `broadcast_capacity`; when it is full the update is dropped. A single
/// dispatch task drains that queue in order and hands each update to every
/// subscriber's own bounded queue, again dropping on full. Each subscriber has
/// a dedicated writer task, so a slow connection only ever loses its own
/// updates.
#[derive(Clone)]
pub struct BroadcastHub {
    shared: Arc<HubShared>,
    queue: mpsc::Sender<LeaderboardUpdate>,
}

impl BroadcastHub {
    /// Start the dispatch loop. Cancelling `shutdown` stops dispatch and
    /// closes every subscriber.
    pub fn spawn(config: HubConfig, shutdown: CancellationToken) -> Self {
        let (queue, rx) = mpsc::channel(config.broadcast_capacity.max(1));
        let shared = Arc::new(HubShared {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            config,
            shutdown,
        });
        spawn_named_task("broadcast-dispatch", dispatch_loop(Arc::clone(&shared), rx));
        Self { shared, queue }
    }

    pub fn publish(&self, update: LeaderboardUpdate) -> PublishOutcome {
        match self.queue.try_send(update) {
            Ok(()) => {
                self.shared.published.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::Queued
            }
            Err(TrySendError::Full(update)) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    target: LOG_TARGET,
                    username = %update.username,
                    dropped,
                    "broadcast queue full, dropping update"
                );
                PublishOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(target: LOG_TARGET, "hub stopped, dropping update");
                PublishOutcome::Dropped
            }
        }
    }

    pub fn register<S>(&self, sink: S) -> Subscription
    where
        S: SubscriberSink,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.shared.config.subscriber_queue.max(1));
        let cancel = self.shared.shutdown.child_token();
        self.shared
            .subscribers
            .insert(id, SubscriberHandle::new(tx, cancel.clone()));
        if self.shared.shutdown.is_cancelled() {
            self.shared.evict(id, EvictReason::Shutdown);
        }

        spawn_named_task(
            format!("subscriber-writer-{id}"),
            run_writer(
                id,
                sink,
                rx,
                cancel.clone(),
                Arc::downgrade(&self.shared),
                self.shared.config.write_timeout,
            ),
        );

        info!(
            target: LOG_TARGET,
            subscriber = id,
            live = self.shared.subscribers.len(),
            "subscriber registered"
        );
        Subscription { id, closed: cancel }
    }

    /// Remove a subscriber and release its connection. Returns `false` if it
    /// was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.shared.evict(id, EvictReason::Unregistered)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.shared.subscribers.contains_key(&id)
    }

    /// Updates currently waiting for the dispatch loop.
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

async fn dispatch_loop(shared: Arc<HubShared>, mut queue: mpsc::Receiver<LeaderboardUpdate>) {
    info!(
        target: LOG_TARGET,
        capacity = shared.config.broadcast_capacity,
        "broadcast dispatch started"
    );
    loop {
        let update = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(update) => update,
                None => break,
            },
        };
        shared.fan_out(&update);
    }
    shared.close_all();
    info!(target: LOG_TARGET, "broadcast dispatch stopped");
}

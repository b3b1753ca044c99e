use serde::{Deserialize, Serialize};

pub mod hub;
pub mod sink;
mod subscriber;

pub use hub::{BroadcastHub, PublishOutcome, Subscription, SubscriberId};
pub use sink::{ChannelSink, SinkError, SubscriberSink};

/// Transient notice that a player's committed total changed. Pushed to live
/// subscribers as a JSON frame; never stored or replayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardUpdate {
    pub username: String,
    pub score: i64,
}

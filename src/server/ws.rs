use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::Extension;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::realtime::{BroadcastHub, SinkError, SubscriberSink};

use super::routes::AppContext;

const LOG_TARGET: &str = "leaderboard::server::ws";

/// Write half of an upgraded socket, driven by the hub's writer task.
struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl SubscriberSink for WsSink {
    async fn send_frame(&mut self, frame: String) -> Result<(), SinkError> {
        self.0
            .send(Message::Text(frame))
            .await
            .map_err(|err| SinkError::Write(err.to_string()))
    }

    async fn close(&mut self) {
        if let Err(err) = SinkExt::close(&mut self.0).await {
            debug!(target: LOG_TARGET, error = %err, "socket close failed");
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(ctx): Extension<Arc<AppContext>>,
) -> Response {
    let hub = ctx.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: BroadcastHub) {
    let (outbound, mut inbound) = socket.split();
    let subscription = hub.register(WsSink(outbound));

    // Client frames carry nothing; they are read only so a disconnect is
    // noticed.
    loop {
        tokio::select! {
            _ = subscription.closed.cancelled() => break,
            next = inbound.next() => match next {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(target: LOG_TARGET, subscriber = subscription.id, error = %err, "socket read failed");
                    break;
                }
            },
        }
    }

    hub.unregister(subscription.id);
}

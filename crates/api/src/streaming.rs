//! WebSocket streaming API.
//!
//! Each connection views exactly one poll. The registry maps poll ids to the
//! live set of subscribed connections; the dispatcher pushes freshly
//! projected tallies to every member of a poll's set and evicts connections
//! it can no longer reach.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use fastvote_common::{Metrics, get_metrics};
use fastvote_core::Tally;
use fastvote_db::repositories::OptionTally;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

use crate::middleware::AppState;

/// Process-unique identifier of one WebSocket connection.
pub type ConnectionId = u64;

/// Server-to-client stream event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum StreamEvent {
    /// A poll's tally changed.
    VoteUpdate(TallyPayload),
}

/// Tally payload carried by a [`StreamEvent::VoteUpdate`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyPayload {
    pub poll_id: String,
    pub options: Vec<OptionTallyView>,
}

/// One option's share of a tally payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTallyView {
    pub option_id: String,
    pub text: String,
    pub vote_count: i64,
}

impl From<&OptionTally> for OptionTallyView {
    fn from(row: &OptionTally) -> Self {
        Self {
            option_id: row.option_id.clone(),
            text: row.text.clone(),
            vote_count: row.vote_count,
        }
    }
}

impl TallyPayload {
    /// Build the wire payload from a projected tally.
    #[must_use]
    pub fn from_tally(tally: &Tally) -> Self {
        Self {
            poll_id: tally.poll_id.clone(),
            options: tally.options.iter().map(OptionTallyView::from).collect(),
        }
    }
}

/// A live subscription to one poll's event stream.
///
/// Dropping the subscription (or its eviction by the dispatcher) closes the
/// channel; the owning connection task observes `None` from [`Self::recv`].
pub struct Subscription {
    poll_id: String,
    connection_id: ConnectionId,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscription {
    /// The poll this subscription targets.
    #[must_use]
    pub fn poll_id(&self) -> &str {
        &self.poll_id
    }

    /// The subscribing connection's id.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Wait for the next serialized event, or `None` once evicted.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// Shared registry of poll subscribers plus the broadcast dispatcher.
///
/// Constructed once at startup and handed to handlers through application
/// state; tests construct their own instance.
#[derive(Clone)]
pub struct StreamingState {
    subscribers: Arc<RwLock<HashMap<String, HashMap<ConnectionId, mpsc::UnboundedSender<String>>>>>,
    next_connection_id: Arc<AtomicU64>,
}

impl StreamingState {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new connection under a poll id.
    ///
    /// The caller must have verified the poll exists. The per-poll set is
    /// created lazily on first subscribe.
    pub async fn subscribe(&self, poll_id: &str) -> Subscription {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(poll_id.to_string())
            .or_default()
            .insert(connection_id, tx);

        Metrics::increment(&get_metrics().websocket_connections_active);
        debug!(poll_id, connection_id, "Connection subscribed");

        Subscription {
            poll_id: poll_id.to_string(),
            connection_id,
            rx,
        }
    }

    /// Remove a connection from its poll's subscriber set.
    ///
    /// Idempotent: removing an already-removed connection is a no-op. The
    /// per-poll set is discarded once empty.
    pub async fn unsubscribe(&self, poll_id: &str, connection_id: ConnectionId) {
        let mut subscribers = self.subscribers.write().await;
        let Some(members) = subscribers.get_mut(poll_id) else {
            return;
        };
        if members.remove(&connection_id).is_none() {
            return;
        }
        if members.is_empty() {
            subscribers.remove(poll_id);
        }

        Metrics::decrement(&get_metrics().websocket_connections_active);
        debug!(poll_id, connection_id, "Connection unsubscribed");
    }

    /// Deliver an event to every subscriber of a poll.
    ///
    /// The event is serialized once. A connection whose channel is gone is
    /// evicted on the spot; failures never abort delivery to the remaining
    /// subscribers and are never retried. Returns the delivered count.
    pub async fn broadcast(&self, poll_id: &str, event: &StreamEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(poll_id, error = %e, "Failed to serialize stream event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            let Some(members) = subscribers.get(poll_id) else {
                return 0;
            };
            for (&connection_id, tx) in members {
                if tx.send(json.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(connection_id);
                }
            }
        }

        for connection_id in dead {
            Metrics::increment(&get_metrics().broadcast_failures);
            warn!(poll_id, connection_id, "Evicting unreachable subscriber");
            self.unsubscribe(poll_id, connection_id).await;
        }

        Metrics::add(&get_metrics().broadcast_deliveries, delivered as u64);
        debug!(poll_id, delivered, "Broadcast dispatched");
        delivered
    }

    /// Number of live subscribers for a poll.
    pub async fn subscriber_count(&self, poll_id: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(poll_id)
            .map_or(0, HashMap::len)
    }
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket handler for a poll's live tally stream.
pub async fn poll_stream_handler(
    ws: WebSocketUpgrade,
    Path(poll_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    info!(%poll_id, "New streaming connection");

    ws.on_upgrade(move |socket| handle_socket(socket, poll_id, state))
}

/// Handle a WebSocket connection for one poll.
async fn handle_socket(mut socket: WebSocket, poll_id: String, state: AppState) {
    // Validate the poll before entering the registry; an unknown poll gets a
    // policy close and the connection is never considered open.
    match state.poll_service.poll_exists(&poll_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(%poll_id, "Rejecting stream for unknown poll");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "poll not found".into(),
                })))
                .await;
            return;
        }
        Err(e) => {
            error!(%poll_id, error = %e, "Poll lookup failed during connect");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "internal error".into(),
                })))
                .await;
            return;
        }
    }

    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.streaming.subscribe(&poll_id).await;

    info!(%poll_id, connection_id = subscription.connection_id(), "Streaming connection established");

    // Initial snapshot so the client does not race the next vote.
    match state.vote_service.project(&poll_id).await {
        Ok(tally) => {
            let event = StreamEvent::VoteUpdate(TallyPayload::from_tally(&tally));
            let json = serde_json::to_string(&event).unwrap_or_default();
            if sender.send(Message::Text(json.into())).await.is_err() {
                state
                    .streaming
                    .unsubscribe(&poll_id, subscription.connection_id())
                    .await;
                return;
            }
        }
        Err(e) => {
            warn!(%poll_id, error = %e, "Failed to project initial tally");
        }
    }

    loop {
        tokio::select! {
            // Inbound frames: viewers send no meaningful content; disconnect
            // is the only signal.
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%poll_id, "Client closed connection");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(%poll_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            // Outbound tally updates, in commit order for this poll.
            update = subscription.recv() => {
                match update {
                    Some(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    // Evicted by the dispatcher after a failed delivery.
                    None => break,
                }
            }
        }
    }

    // Reached from every exit path; unsubscribe is idempotent even if the
    // dispatcher already evicted this connection.
    state
        .streaming
        .unsubscribe(&poll_id, subscription.connection_id())
        .await;

    info!(%poll_id, connection_id = subscription.connection_id(), "Streaming connection closed");
}

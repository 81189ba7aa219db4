//! # Notification Channel
//!
//! Per-user change notifications over WebSocket.
//!
//! The `NotificationHub` keeps one broadcast room per user. Handlers publish
//! each committed mutation while still holding the engine write lock, so the
//! order a subscriber observes equals commit order. Delivery is best-effort,
//! at-most-once: a slow or disconnected session misses events and recovers
//! with a full fetch on reconnect, never with a replay.
//!
//! The handshake authenticates a `?token=` query parameter through the same
//! token map as the HTTP API, BEFORE any room is joined. A session only ever
//! receives events for its own user.

use super::AppState;
use super::types::{EventFrame, GreetingFrame, WsQuery};
use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ecotrace_core::{CentiKg, EmissionEvent, Engine, UserId};
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{RwLock, broadcast};

/// Buffered events per room before slow subscribers start losing frames.
const ROOM_CAPACITY: usize = 64;

// =============================================================================
// NOTIFICATION HUB
// =============================================================================

/// One broadcast room per user id.
#[derive(Debug, Clone, Default)]
pub struct NotificationHub {
    rooms: Arc<Mutex<BTreeMap<u64, broadcast::Sender<EmissionEvent>>>>,
}

impl NotificationHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the user's room, creating it on first subscribe.
    #[must_use]
    pub fn subscribe(&self, user: UserId) -> broadcast::Receiver<EmissionEvent> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms
            .entry(user.0)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Fan an event out to its owner's room only. Rooms whose last
    /// subscriber has gone are pruned on the spot.
    pub fn publish(&self, event: &EmissionEvent) {
        let user = event.owner();
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = rooms.get(&user.0)
            && sender.send(event.clone()).is_err()
        {
            rooms.remove(&user.0);
        }
    }

    /// Number of rooms with at least one past subscriber.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// =============================================================================
// WEBSOCKET HANDLER
// =============================================================================

/// `GET /ws?token=<token>` — authenticate, then upgrade and join the
/// caller's room.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = query.token else {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_ws_token",
            "WebSocket handshake without token refused"
        );
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };
    let Some(user) = state.tokens.resolve(&token) else {
        tracing::warn!(
            event = "auth_failure",
            reason = "invalid_ws_token",
            "WebSocket handshake with invalid token refused"
        );
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };

    let hub = state.hub.clone();
    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user, hub, engine))
}

/// Pump the user's room into the socket until either side goes away.
async fn handle_socket(
    socket: WebSocket,
    user: UserId,
    hub: NotificationHub,
    engine: Arc<RwLock<Engine>>,
) {
    let mut events = hub.subscribe(user);
    // Subscribe before reading the total: a mutation committed before the
    // read is covered by the greeting, one committed after arrives as an
    // event. Nothing falls in between.
    let total = match engine.read().await.ledger_total(user) {
        Ok(total) => total,
        Err(error) => {
            tracing::warn!(user_id = user.0, %error, "ledger total unavailable for greeting");
            CentiKg::ZERO
        }
    };
    let (mut sink, mut stream) = socket.split();

    let greeting = serde_json::to_string(&GreetingFrame::for_user(user, total)).unwrap_or_default();
    if sink.send(Message::Text(greeting.into())).await.is_err() {
        return;
    }
    tracing::debug!(user_id = user.0, "notification session connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame =
                        serde_json::to_string(&EventFrame::from_event(&event)).unwrap_or_default();
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // At-most-once delivery: drop what we missed, keep going.
                    tracing::debug!(user_id = user.0, missed, "notification session lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Inbound frames carry nothing; the channel is one-way.
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!(user_id = user.0, "notification session closed");
}

// =============================================================================
// TESTS
// =============================================================================

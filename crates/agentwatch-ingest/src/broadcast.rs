//! Live fan-out channel
//!
//! The broadcaster is a registry of connected dashboard clients. Delivery is
//! best-effort: a failed send silently removes the client without touching
//! the write path or the other clients. Message order equals write order
//! (one sequential send loop per broadcast, one ordered channel per client).

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use agentwatch_core::stream::StreamMessage;

use crate::AppState;
use crate::events::RECENT_EVENTS_DEFAULT;

pub type ClientId = Uuid;

/// Registry of live dashboard clients.
///
/// Injectable into handlers and tests alike: tests register a plain channel
/// instead of a socket and observe broadcasts directly.
#[derive(Default)]
pub struct Broadcaster {
    clients: DashMap<ClientId, mpsc::UnboundedSender<String>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client; the receiver yields every subsequent broadcast.
    pub fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.clients.insert(id, tx);
        (id, rx)
    }

    pub fn unregister(&self, id: &ClientId) {
        self.clients.remove(id);
    }

    /// Push one message to every connected client.
    ///
    /// Clients whose channel is gone are pruned here; the caller's write has
    /// already committed and is never affected.
    pub fn broadcast(&self, message: &StreamMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, kind = message.kind(), "failed to encode stream message");
                return;
            }
        };

        let before = self.clients.len();
        self.clients.retain(|_, tx| tx.send(text.clone()).is_ok());
        let pruned = before - self.clients.len();
        if pruned > 0 {
            tracing::debug!(pruned, "removed disconnected dashboard clients");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

/// `GET /stream`: upgrade to the live channel.
pub async fn stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut rx) = state.broadcaster.register();
    let (mut sender, mut receiver) = socket.split();
    tracing::debug!(client = %id, "dashboard client connected");

    // Bounded backlog, pushed before any live message
    let backlog = match state.store.recent_events(RECENT_EVENTS_DEFAULT).await {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load backlog for new client");
            Vec::new()
        }
    };
    let initial = match serde_json::to_string(&StreamMessage::Initial(backlog)) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode initial backlog");
            state.broadcaster.unregister(&id);
            return;
        }
    };
    if sender.send(Message::Text(initial.into())).await.is_err() {
        state.broadcaster.unregister(&id);
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                // Client frames carry nothing; only close matters
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.broadcaster.unregister(&id);
    tracing::debug!(client = %id, "dashboard client disconnected");
}

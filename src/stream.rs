//! Live event stream over WebSocket.
//!
//! Grounded in the reference `main.py`'s `_ws_clients` set / `_broadcast_event`
//! helper / `_heartbeat_broadcaster` background task, adapted to axum's
//! `ws` extractor: each connected client gets an mpsc sender registered in
//! a `dashmap`-backed registry, broadcast is best-effort (a full or closed
//! channel just drops that client), and a 10-second heartbeat loop pushes
//! a `heartbeat` event to every connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const CLIENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
pub struct StreamRegistry {
    clients: DashMap<Uuid, mpsc::Sender<Value>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `payload` to every connected client. A send failure (client
    /// disconnected, channel full) just drops that client from the
    /// registry rather than failing the broadcast for everyone else.
    pub fn broadcast(&self, payload: Value) {
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            if entry.value().try_send(payload.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.clients.remove(&id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn register(&self, sender: mpsc::Sender<Value>) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.insert(id, sender);
        id
    }

    fn unregister(&self, id: Uuid) {
        self.clients.remove(&id);
    }
}

/// Background task that pushes a `heartbeat` event to every connected
/// client every [`HEARTBEAT_INTERVAL`], mirroring the reference
/// `_heartbeat_broadcaster`. Runs until `shutdown` is cancelled.
pub async fn heartbeat_loop(registry: Arc<StreamRegistry>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                registry.broadcast(serde_json::json!({ "type": "heartbeat", "ts": chrono::Utc::now() }));
            }
        }
    }
}

pub async fn ws_events(
    State(registry): State<Arc<StreamRegistry>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(mut socket: WebSocket, registry: Arc<StreamRegistry>) {
    let (tx, mut rx) = mpsc::channel::<Value>(CLIENT_CHANNEL_CAPACITY);
    let client_id = registry.register(tx);

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(payload) = outgoing else { break };
                let Ok(text) = serde_json::to_string(&payload) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {
                        if socket.send(Message::Text(r#"{"type":"ack"}"#.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    debug!(%client_id, "websocket client disconnected");
    registry.unregister(client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_to_registered_clients() {
        let registry = StreamRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(tx);

        registry.broadcast(serde_json::json!({"type": "heartbeat"}));
        let received = rx.recv().await.unwrap();
        assert_eq!(received["type"], "heartbeat");
    }

    #[tokio::test]
    async fn broadcast_drops_clients_whose_channel_is_full() {
        let registry = StreamRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(tx);

        for _ in 0..(CLIENT_CHANNEL_CAPACITY + 5) {
            registry.broadcast(serde_json::json!({"type": "heartbeat"}));
        }

        assert_eq!(registry.client_count(), 0);
    }
}

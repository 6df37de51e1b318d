use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, error};
use uuid::Uuid;

use felicity_types::events::GatewayEvent;

/// A room-scoped event, serialized once and fanned out to every connection.
#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub event_id: Uuid,
    pub json: Arc<str>,
}

struct ConnectionHandle {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Manages all connected clients and fans out events.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connection receives every room message and filters by the rooms it joined
    broadcast_tx: broadcast::Sender<RoomMessage>,

    /// Per-connection targeted send channels: conn_id -> handle
    connections: RwLock<HashMap<Uuid, ConnectionHandle>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to room messages. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to its room. Events without a room are dropped;
    /// use [`Dispatcher::send_to_user`] for those.
    pub fn publish(&self, event: &GatewayEvent) {
        let Some(event_id) = event.event_id() else {
            debug!("Dropping unscoped event passed to publish");
            return;
        };
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize gateway event: {}", e);
                return;
            }
        };
        // No receivers just means nobody is connected
        let _ = self.inner.broadcast_tx.send(RoomMessage {
            event_id,
            json: json.into(),
        });
    }

    /// Register a connection's targeted channel. Returns (conn_id, receiver).
    pub async fn register_connection(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, ConnectionHandle { user_id, tx });
        (conn_id, rx)
    }

    pub async fn unregister_connection(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Send an event to one connection.
    pub async fn send_to_connection(&self, conn_id: Uuid, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(handle) = connections.get(&conn_id) {
            let _ = handle.tx.send(event);
        }
    }

    /// Send an event to every connection of a user. Returns how many
    /// connections it was queued on.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let connections = self.inner.connections.read().await;
        connections
            .values()
            .filter(|handle| handle.user_id == user_id)
            .filter(|handle| handle.tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

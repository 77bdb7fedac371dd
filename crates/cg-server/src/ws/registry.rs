//! In-memory registry of open WebSocket connections.
//!
//! Membership mirrors the set of live transports: an entry is added once the
//! upgrade completes and removed when the socket closes. All access goes
//! through one lock so `all()` always sees a consistent membership set.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

// ─── Connection handle ───────────────────────────────────────

/// Channel sender capable of pushing WS frames to a connected peer.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Identifier assigned to a connection when its upgrade is accepted.
pub type ConnectionId = Uuid;

/// Handle to one open socket. Frames sent through it are written in order
/// by the socket's forwarding task.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    tx: WsSender,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: WsSender) -> Self {
        Self { id, tx }
    }

    /// Queue a frame. Returns `false` once the socket's writer is gone.
    pub fn send(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }

    fn is_same(&self, other: &Connection) -> bool {
        self.id == other.id && self.tx.same_channel(&other.tx)
    }
}

// ─── Registry ────────────────────────────────────────────────

/// Central registry shared by the upgrade handler and the relay.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a newly-opened connection. A second registration under the same
    /// id replaces the first.
    pub fn register(&self, connection: Connection) {
        let id = connection.id;
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if connections.insert(id, connection).is_some() {
            tracing::warn!(%id, "Connection re-registered, previous handle replaced");
        }
        tracing::info!(%id, open = connections.len(), "Connection registered");
    }

    /// Remove `connection` if the registry still holds that exact handle.
    /// Unknown ids are ignored, and a stale handle never removes a newer
    /// registration under the same id.
    pub fn unregister(&self, connection: &Connection) -> bool {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match connections.get(&connection.id) {
            Some(current) if current.is_same(connection) => {
                connections.remove(&connection.id);
                tracing::info!(
                    id = %connection.id,
                    open = connections.len(),
                    "Connection unregistered"
                );
                true
            }
            _ => false,
        }
    }

    /// Snapshot of current members. Later mutations don't affect it.
    pub fn all(&self) -> Vec<Connection> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send a Close frame to every member and empty the registry.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Connection> = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, connection)| connection)
            .collect();

        for connection in &drained {
            connection.send(Message::Close(None));
        }
        drained.len()
    }
}

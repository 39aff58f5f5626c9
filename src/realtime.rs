// ABOUTME: In-memory hub tracking live socket connections and their vault rooms
// ABOUTME: Broadcasts source events to every connection joined to a vault's room

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth_helpers::AuthUser;
use crate::entities::source;
use crate::permissions::Role;

pub type ConnectionId = Uuid;

/// Who triggered a broadcast event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActor {
    pub user_id: Uuid,
    pub user_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultJoined {
    pub vault_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketError {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCreated {
    pub source: source::Model,
    pub actor: EventActor,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDeleted {
    pub source_id: Uuid,
    pub vault_id: Uuid,
    pub actor: EventActor,
    pub timestamp: DateTime<Utc>,
}

/// Server-to-client frames, serialized as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "vault:joined")]
    VaultJoined(VaultJoined),
    #[serde(rename = "error")]
    Error(SocketError),
    #[serde(rename = "source:created")]
    SourceCreated(SourceCreated),
    #[serde(rename = "source:deleted")]
    SourceDeleted(SourceDeleted),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(SocketError {
            message: message.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::VaultJoined(_) => "vault:joined",
            ServerEvent::Error(_) => "error",
            ServerEvent::SourceCreated(_) => "source:created",
            ServerEvent::SourceDeleted(_) => "source:deleted",
        }
    }
}

struct Connection {
    identity: AuthUser,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

#[derive(Default)]
pub struct Hub {
    inner: RwLock<HubInner>,
}

pub fn room_name(vault_id: &str) -> String {
    format!("vault:{}", vault_id)
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an authenticated connection. Its identity is fixed for the connection's lifetime.
    pub fn register(&self, identity: AuthUser) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        if let Ok(mut inner) = self.inner.write() {
            tracing::debug!("Socket {} connected for user {}", id, identity.user_id);
            inner.connections.insert(id, Connection { identity, sender });
        }

        (id, receiver)
    }

    /// Drops the connection and removes it from every room it had joined.
    pub fn unregister(&self, id: ConnectionId) {
        if let Ok(mut inner) = self.inner.write() {
            if let Some(connection) = inner.connections.remove(&id) {
                tracing::debug!(
                    "Socket {} disconnected for user {}",
                    id,
                    connection.identity.user_id
                );
            }
            inner.rooms.retain(|_, members| {
                members.remove(&id);
                !members.is_empty()
            });
        }
    }

    pub fn join(&self, id: ConnectionId, vault_id: &str) -> bool {
        let Ok(mut inner) = self.inner.write() else {
            return false;
        };
        if !inner.connections.contains_key(&id) {
            return false;
        }
        inner.rooms.entry(room_name(vault_id)).or_default().insert(id);
        true
    }

    /// Leaving a room that was never joined is a no-op.
    pub fn leave(&self, id: ConnectionId, vault_id: &str) {
        if let Ok(mut inner) = self.inner.write() {
            let room = room_name(vault_id);
            let now_empty = match inner.rooms.get_mut(&room) {
                Some(members) => {
                    members.remove(&id);
                    members.is_empty()
                }
                None => false,
            };
            if now_empty {
                inner.rooms.remove(&room);
            }
        }
    }

    pub fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let Ok(inner) = self.inner.read() else {
            return false;
        };
        match inner.connections.get(&id) {
            Some(connection) => connection.sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Sends the event to every connection in the vault's room, returning how many received it.
    /// Delivery failures are logged and otherwise ignored.
    pub fn broadcast(&self, vault_id: &str, event: ServerEvent) -> usize {
        let room = room_name(vault_id);
        let Ok(inner) = self.inner.read() else {
            tracing::error!("Hub lock poisoned, dropping {} for {}", event.name(), room);
            return 0;
        };

        let Some(members) = inner.rooms.get(&room) else {
            return 0;
        };

        let mut delivered = 0;
        for id in members {
            match inner.connections.get(id) {
                Some(connection) if connection.sender.send(event.clone()).is_ok() => delivered += 1,
                _ => tracing::warn!("Failed to deliver {} to socket {} in {}", event.name(), id, room),
            }
        }

        tracing::debug!("Broadcast {} to {} socket(s) in {}", event.name(), delivered, room);
        delivered
    }

    pub fn room_size(&self, vault_id: &str) -> usize {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.rooms.get(&room_name(vault_id)).map(HashSet::len))
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.connections.len())
            .unwrap_or(0)
    }
}

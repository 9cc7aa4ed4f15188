//! Presence registry
//!
//! Tracks every live websocket connection and which user it belongs to.
//! A user counts as online exactly while they have at least one registered
//! connection; dropping the last connection drops the user entry with it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::ServerEvent;
use crate::store::UserId;

/// Unique identifier for one websocket connection
pub type ConnectionId = Uuid;

/// Bound on pushing an event into a connection's outbound channel.
/// On timeout the event is dropped for that connection; completed
/// server-side work is not rolled back.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// One live websocket connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection's unique identifier, minted at handshake
    pub connection_id: ConnectionId,
    /// Authenticated user behind this connection
    pub user_id: UserId,
    /// Display name resolved at handshake time
    pub username: String,
    /// Avatar URL resolved at handshake time
    pub profile_picture_url: Option<String>,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Outbound channel into this connection's forwarding task
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle for a freshly authenticated connection
    pub fn new(
        user_id: UserId,
        username: String,
        profile_picture_url: Option<String>,
        sender: mpsc::Sender<ServerEvent>,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user_id,
            username,
            profile_picture_url,
            connected_at: Utc::now(),
            sender,
        }
    }

    /// Push an event into this connection's outbound channel.
    ///
    /// Returns false if the connection is gone or the channel stays full
    /// past [`DELIVERY_TIMEOUT`].
    pub async fn deliver(&self, event: ServerEvent) -> bool {
        match tokio::time::timeout(DELIVERY_TIMEOUT, self.sender.send(event)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    user_id = %self.user_id,
                    "Dropping event: outbound channel full past delivery timeout"
                );
                false
            }
        }
    }
}

/// Registry of live connections and the users behind them
#[derive(Default)]
pub struct PresenceRegistry {
    /// All live connections
    connections: DashMap<ConnectionId, ConnectionHandle>,
    /// Connections per user
    by_user: DashMap<UserId, HashSet<ConnectionId>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection
    pub fn register(&self, handle: ConnectionHandle) {
        self.by_user
            .entry(handle.user_id)
            .or_default()
            .insert(handle.connection_id);
        self.connections.insert(handle.connection_id, handle);
    }

    /// Remove a connection. Idempotent; removing the last connection of a
    /// user removes the user's presence entry entirely.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<ConnectionHandle> {
        let (_, handle) = self.connections.remove(connection_id)?;

        if let Some(mut entry) = self.by_user.get_mut(&handle.user_id) {
            entry.remove(connection_id);
            let now_empty = entry.is_empty();
            drop(entry);
            if now_empty {
                self.by_user
                    .remove_if(&handle.user_id, |_, conns| conns.is_empty());
            }
        }

        Some(handle)
    }

    /// Look up a connection
    pub fn get(&self, connection_id: &ConnectionId) -> Option<ConnectionHandle> {
        self.connections.get(connection_id).map(|h| h.clone())
    }

    /// Snapshot of all connections a user currently holds
    pub fn connections_for_user(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        let ids: Vec<ConnectionId> = match self.by_user.get(&user_id) {
            Some(entry) => entry.iter().copied().collect(),
            None => return Vec::new(),
        };

        ids.iter()
            .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
            .collect()
    }

    /// Whether the user has at least one live connection
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.by_user
            .get(&user_id)
            .is_some_and(|conns| !conns.is_empty())
    }

    /// Snapshot of all currently online user ids
    pub fn online_user_ids(&self) -> Vec<UserId> {
        self.by_user.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

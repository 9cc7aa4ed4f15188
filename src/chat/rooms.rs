//! Room session management
//!
//! Tracks which connections have joined which project room and fans events
//! out to room members. Membership is per connection, not per user: two tabs
//! of the same user join and leave independently. Fan-outs are serialized
//! per room, so every member observes broadcasts in the same order.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::presence::{ConnectionId, PresenceRegistry};
use super::protocol::{RoomName, ServerEvent};
use crate::store::ProjectId;

/// One project room: its joined connections plus the lock that orders
/// fan-outs to them
#[derive(Default)]
struct Room {
    members: HashSet<ConnectionId>,
    send_order: Arc<Mutex<()>>,
}

/// Membership map plus broadcast fan-out for project chat rooms
pub struct RoomSessionManager {
    presence: Arc<PresenceRegistry>,
    /// Rooms with at least one joined connection
    rooms: DashMap<ProjectId, Room>,
}

impl RoomSessionManager {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self {
            presence,
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub fn join(&self, room: RoomName, connection_id: ConnectionId) {
        self.rooms
            .entry(room.project_id())
            .or_default()
            .members
            .insert(connection_id);
    }

    /// Remove a connection from a room. Returns whether it was a member.
    /// An emptied room is dropped from the map.
    pub fn leave(&self, room: RoomName, connection_id: &ConnectionId) -> bool {
        let project_id = room.project_id();
        let was_member = match self.rooms.get_mut(&project_id) {
            Some(mut entry) => entry.members.remove(connection_id),
            None => return false,
        };

        self.rooms.remove_if(&project_id, |_, room| room.members.is_empty());
        was_member
    }

    /// Remove a connection from every room it has joined. Returns the rooms
    /// it was actually a member of. Idempotent.
    pub fn leave_all(&self, connection_id: &ConnectionId) -> Vec<ProjectId> {
        let mut left = Vec::new();

        for mut entry in self.rooms.iter_mut() {
            if entry.value_mut().members.remove(connection_id) {
                left.push(*entry.key());
            }
        }
        self.rooms.retain(|_, room| !room.members.is_empty());

        left
    }

    /// Whether the connection has joined the room
    pub fn is_member(&self, room: RoomName, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(&room.project_id())
            .is_some_and(|entry| entry.members.contains(connection_id))
    }

    /// Snapshot of the room's current members
    pub fn members(&self, room: RoomName) -> Vec<ConnectionId> {
        self.rooms
            .get(&room.project_id())
            .map(|entry| entry.members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of connections in the room
    pub fn member_count(&self, room: RoomName) -> usize {
        self.rooms
            .get(&room.project_id())
            .map(|entry| entry.members.len())
            .unwrap_or(0)
    }

    /// Number of rooms with at least one member
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Fan an event out to every member of the room, excluding at most one
    /// connection. Returns how many members the event was delivered to.
    ///
    /// Only one fan-out runs per room at a time; concurrent broadcasts are
    /// ordered by lock acquisition, so every member observes the same
    /// sequence. Membership is snapshotted under the lock, and a connection
    /// that disconnects mid-broadcast just fails its own channel send.
    pub async fn broadcast(
        &self,
        room: RoomName,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        // Clone the lock handle first; the shard reference must not be
        // held across an await
        let send_order = match self.rooms.get(&room.project_id()) {
            Some(entry) => entry.send_order.clone(),
            None => return 0,
        };

        let _guard = send_order.lock().await;

        let member_ids = self.members(room);
        let handles: Vec<_> = member_ids
            .iter()
            .filter(|id| Some(**id) != exclude)
            .filter_map(|id| self.presence.get(id))
            .collect();

        let mut delivered = 0;
        for handle in handles {
            if handle.deliver(event.clone()).await {
                delivered += 1;
            }
        }

        delivered
    }
}

// ============================================================================
// Tests
// ============================================================================

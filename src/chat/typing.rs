//! Typing signal relay
//!
//! Volatile fan-out of typing start/stop signals to the other members of a
//! room. No persistence, no acks; a signal from a connection that has not
//! joined the room is dropped. Receivers own the expiry timer for a typing
//! indicator that never gets a stop signal.

use std::sync::Arc;

use super::presence::ConnectionHandle;
use super::protocol::{RoomName, ServerEvent};
use super::rooms::RoomSessionManager;

/// Relays typing signals between room members
#[derive(Clone)]
pub struct TypingRelay {
    rooms: Arc<RoomSessionManager>,
}

impl TypingRelay {
    pub fn new(rooms: Arc<RoomSessionManager>) -> Self {
        Self { rooms }
    }

    /// Relay a typing-started signal to the other room members
    pub async fn started(&self, room: RoomName, signaler: &ConnectionHandle) {
        if !self.rooms.is_member(room, &signaler.connection_id) {
            return;
        }

        self.rooms
            .broadcast(
                room,
                ServerEvent::UserTyping {
                    user_id: signaler.user_id,
                    username: signaler.username.clone(),
                },
                Some(signaler.connection_id),
            )
            .await;
    }

    /// Relay a typing-stopped signal to the other room members
    pub async fn stopped(&self, room: RoomName, signaler: &ConnectionHandle) {
        if !self.rooms.is_member(room, &signaler.connection_id) {
            return;
        }

        self.rooms
            .broadcast(
                room,
                ServerEvent::UserStopTyping {
                    user_id: signaler.user_id,
                },
                Some(signaler.connection_id),
            )
            .await;
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Targeted user notification
//!
//! Delivers an event to every connection a user currently holds, regardless
//! of room membership. An offline user is reported as not delivered; there
//! is no queuing, the durable store's history is the catch-up path.

use std::sync::Arc;

use super::presence::PresenceRegistry;
use super::protocol::ServerEvent;
use crate::store::UserId;

/// Fans events out to all connections of one user
#[derive(Clone)]
pub struct TargetedNotifier {
    presence: Arc<PresenceRegistry>,
}

impl TargetedNotifier {
    pub fn new(presence: Arc<PresenceRegistry>) -> Self {
        Self { presence }
    }

    /// Send an event to every live connection of the user.
    ///
    /// Returns true if it reached at least one connection, false if the
    /// user is offline. Offline delivery is not an error and has no side
    /// effects.
    pub async fn notify_user(&self, user_id: UserId, event: ServerEvent) -> bool {
        let handles = self.presence.connections_for_user(user_id);
        if handles.is_empty() {
            return false;
        }

        let mut delivered = 0;
        for handle in handles {
            if handle.deliver(event.clone()).await {
                delivered += 1;
            }
        }

        delivered > 0
    }
}

// ============================================================================
// Tests
// ============================================================================

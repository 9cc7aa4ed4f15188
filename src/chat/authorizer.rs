//! Room authorization
//!
//! Decides whether a user may join a project's chat room: project owners
//! and active members get in, everyone else is denied. The check goes to
//! the store on every join attempt; nothing is cached, so a user whose
//! membership was revoked is denied on their next join.

use std::sync::Arc;

use super::protocol::ChatErrorCode;
use crate::store::{ProjectDirectory, ProjectId, StoreError, UserId};

/// Why a join was refused
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("Invalid room name")]
    InvalidRoomName,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Access denied: you are not a member of this project")]
    AccessDenied,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl JoinError {
    /// Ack code for this failure
    pub fn code(&self) -> ChatErrorCode {
        match self {
            JoinError::InvalidRoomName => ChatErrorCode::InvalidRoomName,
            JoinError::RoomNotFound => ChatErrorCode::RoomNotFound,
            JoinError::AccessDenied => ChatErrorCode::AccessDenied,
            JoinError::Store(_) => ChatErrorCode::InternalError,
        }
    }
}

/// Owner-or-active-member gate in front of room joins
#[derive(Clone)]
pub struct RoomAuthorizer {
    projects: Arc<dyn ProjectDirectory>,
}

impl RoomAuthorizer {
    pub fn new(projects: Arc<dyn ProjectDirectory>) -> Self {
        Self { projects }
    }

    /// Check whether the user may join the project's room.
    ///
    /// A project that does not exist reads as a room that does not exist,
    /// not as an error.
    pub async fn authorize(&self, user_id: UserId, project_id: ProjectId) -> Result<(), JoinError> {
        let project = self
            .projects
            .find_project(project_id)
            .await?
            .ok_or(JoinError::RoomNotFound)?;

        if project.owner_id == user_id {
            return Ok(());
        }

        if self.projects.is_active_member(project_id, user_id).await? {
            return Ok(());
        }

        Err(JoinError::AccessDenied)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn setup() -> (MemoryStore, RoomAuthorizer) {
        let store = MemoryStore::new();
        store.add_project(42, 1).await;
        store.add_member(42, 5).await;

        let authorizer = RoomAuthorizer::new(Arc::new(store.clone()));
        (store, authorizer)
    }

    #[tokio::test]
    async fn test_owner_is_authorized() {
        let (_store, authorizer) = setup().await;
        assert!(authorizer.authorize(1, 42).await.is_ok());
    }

    #[tokio::test]
    async fn test_active_member_is_authorized() {
        let (_store, authorizer) = setup().await;
        assert!(authorizer.authorize(5, 42).await.is_ok());
    }

    #[tokio::test]
    async fn test_stranger_is_denied() {
        let (_store, authorizer) = setup().await;
        let result = authorizer.authorize(9, 42).await;
        assert!(matches!(result, Err(JoinError::AccessDenied)));
    }

    #[tokio::test]
    async fn test_missing_project_is_room_not_found() {
        let (_store, authorizer) = setup().await;
        let result = authorizer.authorize(1, 99).await;
        assert!(matches!(result, Err(JoinError::RoomNotFound)));
    }

    #[tokio::test]
    async fn test_revoked_member_denied_on_next_join() {
        let (store, authorizer) = setup().await;
        assert!(authorizer.authorize(5, 42).await.is_ok());

        store.remove_member(42, 5).await;

        let result = authorizer.authorize(5, 42).await;
        assert!(matches!(result, Err(JoinError::AccessDenied)));
    }

    #[tokio::test]
    async fn test_join_error_codes() {
        assert_eq!(
            JoinError::InvalidRoomName.code(),
            ChatErrorCode::InvalidRoomName
        );
        assert_eq!(JoinError::RoomNotFound.code(), ChatErrorCode::RoomNotFound);
        assert_eq!(JoinError::AccessDenied.code(), ChatErrorCode::AccessDenied);
    }
}

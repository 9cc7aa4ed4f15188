//! Message broker
//!
//! Owns the submit pipeline for chat messages: validate, persist, resolve
//! the sender's current display attributes, broadcast to the room, and hand
//! the persisted representation back for the ack. Validation runs strictly
//! before persistence; a persistence failure suppresses the broadcast.

use std::sync::Arc;

use super::protocol::{ChatErrorCode, ChatMessage, RoomName, ServerEvent};
use super::rooms::RoomSessionManager;
use crate::store::{MessageStore, MessageType, NewMessage, ProjectId, StoreError, UserDirectory, UserId};

/// A sendMessage payload as received from a connection
#[derive(Debug, Clone)]
pub struct MessageSubmission {
    pub project_id: ProjectId,
    pub room_name: String,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
}

/// Why a submission was refused
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),

    #[error("Room does not match project")]
    RoomMismatch,

    #[error("Failed to send message")]
    SenderNotFound,

    #[error("Failed to send message")]
    Persistence(#[from] StoreError),
}

impl SubmitError {
    /// Ack code for this failure
    pub fn code(&self) -> ChatErrorCode {
        match self {
            SubmitError::Validation(_) => ChatErrorCode::Validation,
            SubmitError::RoomMismatch => ChatErrorCode::RoomMismatch,
            SubmitError::SenderNotFound | SubmitError::Persistence(_) => {
                ChatErrorCode::InternalError
            }
        }
    }
}

/// Validate, persist and broadcast chat messages
#[derive(Clone)]
pub struct MessageBroker {
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
    rooms: Arc<RoomSessionManager>,
}

impl MessageBroker {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        rooms: Arc<RoomSessionManager>,
    ) -> Self {
        Self {
            users,
            messages,
            rooms,
        }
    }

    /// Process one message submission end to end.
    ///
    /// On success every room member (the sender's own connections included)
    /// has been sent a `newMessage` event and the persisted representation
    /// is returned for the sender's ack.
    pub async fn submit(
        &self,
        sender_id: UserId,
        submission: MessageSubmission,
    ) -> Result<ChatMessage, SubmitError> {
        let room = Self::validate(&submission)?;

        let new_message = NewMessage {
            project_id: submission.project_id,
            sender_id,
            message_type: submission.message_type,
            content: submission.content,
            file_name: submission.file_name,
            file_url: submission.file_url,
            mime_type: submission.mime_type,
            file_size: submission.file_size,
        };

        let stored = self.messages.insert(&new_message).await.map_err(|err| {
            tracing::error!(
                project_id = %submission.project_id,
                user_id = %sender_id,
                error = %err,
                "Failed to persist chat message"
            );
            SubmitError::Persistence(err)
        })?;

        // Display attributes are read back from the directory for every
        // message, never from the handshake-time snapshot, so renames and
        // avatar changes show up immediately.
        let sender = self
            .users
            .find_user(sender_id)
            .await?
            .ok_or(SubmitError::SenderNotFound)?;

        let message = ChatMessage::from_stored(stored, sender.into());

        let delivered = self
            .rooms
            .broadcast(
                room,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
                None,
            )
            .await;

        tracing::debug!(
            room_id = %room,
            message_id = %message.id,
            delivered,
            "Broadcast chat message"
        );

        Ok(message)
    }

    /// Validation, in the order clients can rely on: room/project
    /// consistency first, then the per-kind payload checks.
    fn validate(submission: &MessageSubmission) -> Result<RoomName, SubmitError> {
        let room: RoomName = submission
            .room_name
            .parse()
            .map_err(|_| SubmitError::RoomMismatch)?;

        if room.project_id() != submission.project_id {
            return Err(SubmitError::RoomMismatch);
        }

        match submission.message_type {
            MessageType::Text => {
                let has_content = submission
                    .content
                    .as_deref()
                    .is_some_and(|text| !text.trim().is_empty());
                if !has_content {
                    return Err(SubmitError::Validation(
                        "Text messages require non-empty content".to_string(),
                    ));
                }
            }
            MessageType::File => {
                let complete = submission.file_name.is_some()
                    && submission.file_url.is_some()
                    && submission.mime_type.is_some()
                    && submission.file_size.is_some();
                if !complete {
                    return Err(SubmitError::Validation(
                        "File messages require fileName, fileUrl, mimeType and fileSize"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(room)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::presence::{ConnectionHandle, ConnectionId, PresenceRegistry};
    use crate::store::{MemoryStore, StoredMessage, UserProfile};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Fixture {
        store: MemoryStore,
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomSessionManager>,
        broker: MessageBroker,
    }

    async fn setup() -> Fixture {
        let store = MemoryStore::new();
        store
            .add_user(UserProfile {
                id: 5,
                username: "ada".to_string(),
                profile_picture_url: None,
            })
            .await;
        store.add_project(42, 5).await;

        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomSessionManager::new(presence.clone()));
        let broker = MessageBroker::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            rooms.clone(),
        );

        Fixture {
            store,
            presence,
            rooms,
            broker,
        }
    }

    fn connect(fixture: &Fixture, user_id: i64) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = ConnectionHandle::new(user_id, format!("user{}", user_id), None, tx);
        let id = handle.connection_id;
        fixture.presence.register(handle);
        (id, rx)
    }

    fn text_submission(content: &str) -> MessageSubmission {
        MessageSubmission {
            project_id: 42,
            room_name: "project-42".to_string(),
            message_type: MessageType::Text,
            content: Some(content.to_string()),
            file_name: None,
            file_url: None,
            mime_type: None,
            file_size: None,
        }
    }

    fn file_submission() -> MessageSubmission {
        MessageSubmission {
            project_id: 42,
            room_name: "project-42".to_string(),
            message_type: MessageType::File,
            content: None,
            file_name: Some("a.pdf".to_string()),
            file_url: Some("/u/a.pdf".to_string()),
            mime_type: Some("application/pdf".to_string()),
            file_size: Some(1024),
        }
    }

    #[tokio::test]
    async fn test_submit_text_message() {
        let fixture = setup().await;

        let message = fixture
            .broker
            .submit(5, text_submission("hello"))
            .await
            .unwrap();

        assert_eq!(message.project_id, 42);
        assert_eq!(message.content.as_deref(), Some("hello"));
        assert_eq!(message.sender.username, "ada");
        assert_eq!(fixture.store.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_submit_complete_file_message() {
        let fixture = setup().await;

        let message = fixture.broker.submit(5, file_submission()).await.unwrap();

        assert_eq!(message.message_type, MessageType::File);
        assert_eq!(message.file_size, Some(1024));
    }

    #[tokio::test]
    async fn test_room_mismatch_rejected_before_persistence() {
        let fixture = setup().await;

        let mut submission = text_submission("hello");
        submission.room_name = "project-7".to_string();

        let result = fixture.broker.submit(5, submission).await;
        assert!(matches!(result, Err(SubmitError::RoomMismatch)));
        assert_eq!(fixture.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_room_name_is_mismatch() {
        let fixture = setup().await;

        let mut submission = text_submission("hello");
        submission.room_name = "project-abc".to_string();

        let result = fixture.broker.submit(5, submission).await;
        assert!(matches!(result, Err(SubmitError::RoomMismatch)));
    }

    #[tokio::test]
    async fn test_whitespace_only_text_rejected() {
        let fixture = setup().await;

        let result = fixture.broker.submit(5, text_submission("   \n\t ")).await;
        assert!(matches!(result, Err(SubmitError::Validation(_))));
        assert_eq!(fixture.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_text_content_rejected() {
        let fixture = setup().await;

        let mut submission = text_submission("x");
        submission.content = None;

        let result = fixture.broker.submit(5, submission).await;
        assert!(matches!(result, Err(SubmitError::Validation(_))));
    }

    #[tokio::test]
    async fn test_file_message_requires_all_attributes() {
        let fixture = setup().await;

        for strip in 0..4 {
            let mut submission = file_submission();
            match strip {
                0 => submission.file_name = None,
                1 => submission.file_url = None,
                2 => submission.mime_type = None,
                _ => submission.file_size = None,
            }

            let result = fixture.broker.submit(5, submission).await;
            assert!(matches!(result, Err(SubmitError::Validation(_))));
        }

        assert_eq!(fixture.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_members_including_sender() {
        let fixture = setup().await;
        let room = RoomName::for_project(42);
        let (sender_conn, mut sender_rx) = connect(&fixture, 5);
        let (member_conn, mut member_rx) = connect(&fixture, 6);
        fixture.rooms.join(room, sender_conn);
        fixture.rooms.join(room, member_conn);

        fixture
            .broker
            .submit(5, text_submission("hello"))
            .await
            .unwrap();

        for rx in [&mut sender_rx, &mut member_rx] {
            match rx.recv().await.unwrap() {
                ServerEvent::NewMessage { message } => {
                    assert_eq!(message.content.as_deref(), Some("hello"));
                }
                other => panic!("Expected newMessage, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_non_members_receive_nothing() {
        let fixture = setup().await;
        let (outside_conn, mut outside_rx) = connect(&fixture, 6);
        let _ = outside_conn;

        fixture
            .broker
            .submit(5, text_submission("hello"))
            .await
            .unwrap();

        assert!(outside_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sender_attributes_resolved_per_message() {
        let fixture = setup().await;
        let room = RoomName::for_project(42);
        let (conn, mut rx) = connect(&fixture, 5);
        fixture.rooms.join(room, conn);

        fixture
            .broker
            .submit(5, text_submission("before"))
            .await
            .unwrap();

        // Rename after the connection was established
        fixture
            .store
            .add_user(UserProfile {
                id: 5,
                username: "ada_lovelace".to_string(),
                profile_picture_url: Some("/avatars/ada.png".to_string()),
            })
            .await;

        fixture
            .broker
            .submit(5, text_submission("after"))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        match (first, second) {
            (
                ServerEvent::NewMessage { message: m1 },
                ServerEvent::NewMessage { message: m2 },
            ) => {
                assert_eq!(m1.sender.username, "ada");
                assert_eq!(m2.sender.username, "ada_lovelace");
                assert_eq!(
                    m2.sender.profile_picture_url.as_deref(),
                    Some("/avatars/ada.png")
                );
            }
            other => panic!("Expected two newMessage events, got {:?}", other),
        }
    }

    // Store that always fails inserts
    struct BrokenMessageStore;

    #[async_trait]
    impl MessageStore for BrokenMessageStore {
        async fn insert(&self, _message: &NewMessage) -> Result<StoredMessage, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn recent(
            &self,
            _project_id: ProjectId,
            _limit: i64,
        ) -> Result<Vec<StoredMessage>, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_suppresses_broadcast() {
        let fixture = setup().await;
        let room = RoomName::for_project(42);
        let (conn, mut rx) = connect(&fixture, 5);
        fixture.rooms.join(room, conn);

        let broker = MessageBroker::new(
            Arc::new(fixture.store.clone()),
            Arc::new(BrokenMessageStore),
            fixture.rooms.clone(),
        );

        let result = broker.submit(5, text_submission("hello")).await;

        let err = result.unwrap_err();
        assert!(matches!(err, SubmitError::Persistence(_)));
        // Generic wording, no store internals
        assert_eq!(err.to_string(), "Failed to send message");
        assert_eq!(err.code(), ChatErrorCode::InternalError);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_sender_is_internal_error() {
        let fixture = setup().await;

        let result = fixture.broker.submit(99, text_submission("hello")).await;

        assert!(matches!(result, Err(SubmitError::SenderNotFound)));
        assert_eq!(result.unwrap_err().code(), ChatErrorCode::InternalError);
    }
}

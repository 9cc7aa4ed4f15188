//! WebSocket protocol events and DTOs for project chat
//!
//! This module defines the message types exchanged between clients and the
//! server, the ack/error codes, and the room naming scheme. Everything on
//! the wire is JSON with camelCase keys, tagged by an `event` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{MessageId, MessageType, ProjectId, StoredMessage, UserId, UserProfile};

// ============================================================================
// Room Naming
// ============================================================================

/// A validated chat room name
///
/// Chat rooms map one-to-one onto projects and are addressed on the wire as
/// `"project-{id}"`. Parsing rejects anything else before any authorization
/// or store work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomName(ProjectId);

/// Room name parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid room name")]
pub struct InvalidRoomName;

impl RoomName {
    /// The room for a given project
    pub fn for_project(project_id: ProjectId) -> Self {
        Self(project_id)
    }

    /// The project this room belongs to
    pub fn project_id(&self) -> ProjectId {
        self.0
    }
}

impl std::str::FromStr for RoomName {
    type Err = InvalidRoomName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suffix = s.strip_prefix("project-").ok_or(InvalidRoomName)?;

        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidRoomName);
        }

        let id = suffix.parse().map_err(|_| InvalidRoomName)?;
        Ok(Self(id))
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "project-{}", self.0)
    }
}

// ============================================================================
// Handshake / REST DTOs
// ============================================================================

/// Error response for HTTP surfaces (handshake rejection, moderation ingress)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: ApiErrorCode,
}

/// HTTP error codes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ApiErrorCode {
    NoToken,
    InvalidToken,
    ExpiredToken,
    UserNotFound,
    BadRequest,
    InternalError,
}

impl ApiError {
    pub fn no_token() -> Self {
        Self {
            error: "Authentication token required".to_string(),
            code: ApiErrorCode::NoToken,
        }
    }

    pub fn invalid_token() -> Self {
        Self {
            error: "Invalid authentication token".to_string(),
            code: ApiErrorCode::InvalidToken,
        }
    }

    pub fn expired_token() -> Self {
        Self {
            error: "Authentication token expired".to_string(),
            code: ApiErrorCode::ExpiredToken,
        }
    }

    pub fn user_not_found() -> Self {
        Self {
            error: "User not found".to_string(),
            code: ApiErrorCode::UserNotFound,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: ApiErrorCode::BadRequest,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: ApiErrorCode::InternalError,
        }
    }
}

/// Request body for the moderation ingress route
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedRequest {
    pub message_id: MessageId,
    pub project_id: ProjectId,
    pub deleted_by: UserId,
}

// ============================================================================
// Chat Message Representation
// ============================================================================

/// Sender display attributes embedded in outbound messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    pub id: UserId,
    pub username: String,
    pub profile_picture_url: Option<String>,
}

impl From<UserProfile> for MessageSender {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            username: profile.username,
            profile_picture_url: profile.profile_picture_url,
        }
    }
}

/// A chat message as delivered to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub project_id: ProjectId,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub sender: MessageSender,
}

impl ChatMessage {
    /// Build the outbound representation of a persisted message
    pub fn from_stored(stored: StoredMessage, sender: MessageSender) -> Self {
        Self {
            id: stored.id,
            project_id: stored.project_id,
            message_type: stored.kind().unwrap_or(MessageType::Text),
            content: stored.content,
            file_name: stored.file_name,
            file_url: stored.file_url,
            mime_type: stored.mime_type,
            file_size: stored.file_size,
            created_at: stored.created_at,
            sender,
        }
    }
}

// ============================================================================
// WebSocket Protocol Events
// ============================================================================

/// Client-to-server events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Join a project chat room
    JoinRoom { room_name: String },

    /// Leave a project chat room (fire-and-forget, no ack)
    LeaveRoom { room_name: String },

    /// Signal that the user started typing (fire-and-forget)
    Typing { room_name: String },

    /// Signal that the user stopped typing (fire-and-forget)
    StopTyping { room_name: String },

    /// Submit a chat message
    SendMessage {
        project_id: ProjectId,
        room_name: String,
        message_type: MessageType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_size: Option<i64>,
    },
}

/// Server-to-client events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Ack for joinRoom
    JoinResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<ChatErrorCode>,
    },

    /// Ack for sendMessage
    MessageResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        sent_message: Option<ChatMessage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<ChatErrorCode>,
    },

    /// A message was posted to a room the connection has joined
    NewMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },

    /// Another room member started typing
    UserTyping { user_id: UserId, username: String },

    /// Another room member stopped typing
    UserStopTyping { user_id: UserId },

    /// A message was removed by moderation
    MessageDeleted {
        message_id: MessageId,
        project_id: ProjectId,
        deleted_by: UserId,
    },
}

/// Ack error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChatErrorCode {
    InvalidRoomName,
    RoomNotFound,
    AccessDenied,
    Validation,
    RoomMismatch,
    InternalError,
}

impl ServerEvent {
    /// Successful join ack
    pub fn join_success(room: RoomName) -> Self {
        Self::JoinResult {
            success: true,
            message: Some(format!("joined {}", room)),
            error: None,
            code: None,
        }
    }

    /// Failed join ack
    pub fn join_failed(code: ChatErrorCode, error: impl Into<String>) -> Self {
        Self::JoinResult {
            success: false,
            message: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }

    /// Successful message ack carrying the persisted representation
    pub fn message_success(message: ChatMessage) -> Self {
        Self::MessageResult {
            success: true,
            sent_message: Some(message),
            error: None,
            code: None,
        }
    }

    /// Failed message ack
    pub fn message_failed(code: ChatErrorCode, error: impl Into<String>) -> Self {
        Self::MessageResult {
            success: false,
            sent_message: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}

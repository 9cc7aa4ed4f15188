//! Durable store access
//!
//! The relational schema (users, projects, project members, chat messages)
//! belongs to the wider platform; this subsystem only consumes it. The
//! traits here are the seam: `postgres` implements them over sqlx, `memory`
//! implements them for tests and for running without a database.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use postgres::{DbConfig, PostgresStore, create_pool, health_check};

/// Numeric user identifier, matching the platform's relational schema
pub type UserId = i64;

/// Numeric project identifier
pub type ProjectId = i64;

/// Numeric chat message identifier
pub type MessageId = i64;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Chat message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    File,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::File => write!(f, "file"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "file" => Ok(MessageType::File),
            _ => Err(()),
        }
    }
}

/// A user's display attributes as stored by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub profile_picture_url: Option<String>,
}

/// A project row, as much of it as this subsystem needs
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub owner_id: UserId,
}

/// Data for a chat message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub project_id: ProjectId,
    pub sender_id: UserId,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
}

/// A persisted chat message
///
/// `message_type` stays a raw string here (the column type); use
/// [`StoredMessage::kind`] for the typed view.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: MessageId,
    pub project_id: ProjectId,
    pub sender_id: UserId,
    pub message_type: String,
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Typed view of the message_type column
    pub fn kind(&self) -> Option<MessageType> {
        self.message_type.parse().ok()
    }
}

/// Resolves user display attributes
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserProfile>, StoreError>;
}

/// Resolves project existence, ownership and active membership
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn find_project(&self, id: ProjectId) -> Result<Option<ProjectRecord>, StoreError>;

    /// Whether the user currently holds an active membership in the project.
    /// Ownership is not membership; the authorizer checks both.
    async fn is_active_member(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<bool, StoreError>;
}

/// Persists and reads back chat messages
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &NewMessage) -> Result<StoredMessage, StoreError>;

    /// Most recent messages for a project, newest first
    async fn recent(
        &self,
        project_id: ProjectId,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::Text.to_string(), "text");
        assert_eq!(MessageType::File.to_string(), "file");
    }

    #[test]
    fn test_message_type_parse() {
        assert_eq!("text".parse(), Ok(MessageType::Text));
        assert_eq!("file".parse(), Ok(MessageType::File));
        assert!("image".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_message_type_serde() {
        assert_eq!(
            serde_json::to_string(&MessageType::Text).unwrap(),
            r#""text""#
        );
        let parsed: MessageType = serde_json::from_str(r#""file""#).unwrap();
        assert_eq!(parsed, MessageType::File);
    }

    #[test]
    fn test_stored_message_kind() {
        let msg = StoredMessage {
            id: 1,
            project_id: 42,
            sender_id: 5,
            message_type: "file".to_string(),
            content: None,
            file_name: Some("a.pdf".to_string()),
            file_url: Some("/u/a.pdf".to_string()),
            mime_type: Some("application/pdf".to_string()),
            file_size: Some(1024),
            created_at: Utc::now(),
        };

        assert_eq!(msg.kind(), Some(MessageType::File));
    }

    #[test]
    fn test_stored_message_unknown_kind() {
        let msg = StoredMessage {
            id: 1,
            project_id: 42,
            sender_id: 5,
            message_type: "sticker".to_string(),
            content: None,
            file_name: None,
            file_url: None,
            mime_type: None,
            file_size: None,
            created_at: Utc::now(),
        };

        assert_eq!(msg.kind(), None);
    }
}

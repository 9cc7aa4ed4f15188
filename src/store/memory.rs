//! In-memory store implementation
//!
//! Backs the server when no DATABASE_URL is configured and doubles as the
//! test fixture for everything above the store seam. Message ids are
//! assigned sequentially, mirroring the bigserial column.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    MessageStore, NewMessage, ProjectDirectory, ProjectId, ProjectRecord, StoreError,
    StoredMessage, UserDirectory, UserId, UserProfile,
};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserProfile>,
    projects: HashMap<ProjectId, ProjectRecord>,
    members: HashMap<ProjectId, HashSet<UserId>>,
    messages: Vec<StoredMessage>,
    next_message_id: i64,
}

/// In-memory implementation of all three store traits
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user
    pub async fn add_user(&self, user: UserProfile) {
        let mut inner = self.inner.lock().await;
        inner.users.insert(user.id, user);
    }

    /// Insert or replace a project
    pub async fn add_project(&self, id: ProjectId, owner_id: UserId) {
        let mut inner = self.inner.lock().await;
        inner.projects.insert(id, ProjectRecord { id, owner_id });
    }

    /// Grant a user active membership in a project
    pub async fn add_member(&self, project_id: ProjectId, user_id: UserId) {
        let mut inner = self.inner.lock().await;
        inner.members.entry(project_id).or_default().insert(user_id);
    }

    /// Revoke a user's membership in a project
    pub async fn remove_member(&self, project_id: ProjectId, user_id: UserId) {
        let mut inner = self.inner.lock().await;
        if let Some(members) = inner.members.get_mut(&project_id) {
            members.remove(&user_id);
        }
    }

    /// Number of persisted messages across all projects
    pub async fn message_count(&self) -> usize {
        self.inner.lock().await.messages.len()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(&id).cloned())
    }
}

#[async_trait]
impl ProjectDirectory for MemoryStore {
    async fn find_project(&self, id: ProjectId) -> Result<Option<ProjectRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.projects.get(&id).cloned())
    }

    async fn is_active_member(
        &self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .members
            .get(&project_id)
            .is_some_and(|members| members.contains(&user_id)))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &NewMessage) -> Result<StoredMessage, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_message_id += 1;

        let stored = StoredMessage {
            id: inner.next_message_id,
            project_id: message.project_id,
            sender_id: message.sender_id,
            message_type: message.message_type.to_string(),
            content: message.content.clone(),
            file_name: message.file_name.clone(),
            file_url: message.file_url.clone(),
            mime_type: message.mime_type.clone(),
            file_size: message.file_size,
            created_at: Utc::now(),
        };

        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn recent(
        &self,
        project_id: ProjectId,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.inner.lock().await;
        let messages = inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.project_id == project_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(messages)
    }
}

//! HTTP surface and shared state for project chat
//!
//! Routes:
//! - `GET  /ws` - WebSocket upgrade (see gateway module)
//! - `GET  /health` - Service and store health
//! - `POST /moderation/message-deleted` - Push a deletion notice to a room
//! - `POST /notify/user` - Push an event to one user's connections

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::authorizer::RoomAuthorizer;
use super::broker::MessageBroker;
use super::gateway::ws_handler;
use super::notify::TargetedNotifier;
use super::presence::PresenceRegistry;
use super::protocol::{MessageDeletedRequest, RoomName, ServerEvent};
use super::rooms::RoomSessionManager;
use super::typing::TypingRelay;
use crate::auth::TokenVerifier;
use crate::store::{MessageStore, ProjectDirectory, UserDirectory, UserId, health_check};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the chat service
#[derive(Clone)]
pub struct ChatState {
    pub verifier: TokenVerifier,
    pub users: Arc<dyn UserDirectory>,
    pub presence: Arc<PresenceRegistry>,
    pub rooms: Arc<RoomSessionManager>,
    pub authorizer: RoomAuthorizer,
    pub broker: MessageBroker,
    pub typing: TypingRelay,
    pub notifier: TargetedNotifier,
    /// Present when backed by PostgreSQL; health reporting only
    pub pool: Option<PgPool>,
}

impl ChatState {
    /// Wire up the chat service on top of the given directories and store
    pub fn new(
        verifier: TokenVerifier,
        users: Arc<dyn UserDirectory>,
        projects: Arc<dyn ProjectDirectory>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomSessionManager::new(presence.clone()));
        let authorizer = RoomAuthorizer::new(projects);
        let broker = MessageBroker::new(users.clone(), messages, rooms.clone());
        let typing = TypingRelay::new(rooms.clone());
        let notifier = TargetedNotifier::new(presence.clone());

        Self {
            verifier,
            users,
            presence,
            rooms,
            authorizer,
            broker,
            typing,
            notifier,
            pool: None,
        }
    }

    /// Attach a database pool for health reporting
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the chat service router
pub fn chat_router(state: ChatState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/moderation/message-deleted", post(message_deleted))
        .route("/notify/user", post(notify_user))
        .with_state(state)
}

// ============================================================================
// API Handlers
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    online_users: usize,
    rooms: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
}

/// Service health
///
/// GET /health
///
/// Reports live connection counts and, when a database pool is attached,
/// the result of a probe query against it.
async fn health(State(state): State<ChatState>) -> impl IntoResponse {
    let database = match &state.pool {
        Some(pool) => match health_check(pool).await {
            Ok(()) => Some("ok"),
            Err(e) => {
                tracing::error!("Database health check failed: {}", e);
                Some("error")
            }
        },
        None => None,
    };

    let degraded = database == Some("error");
    let response = HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        connections: state.presence.connection_count(),
        online_users: state.presence.online_user_ids().len(),
        rooms: state.rooms.room_count(),
        database,
    };

    let status = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModerationResponse {
    delivered: usize,
}

/// Push a message deletion notice into a project's room
///
/// POST /moderation/message-deleted
///
/// Called by the moderation backend after it removes a message, so clients
/// currently in the room drop it from view. Delivery count of zero just
/// means nobody is in the room right now.
async fn message_deleted(
    State(state): State<ChatState>,
    Json(request): Json<MessageDeletedRequest>,
) -> impl IntoResponse {
    let room = RoomName::for_project(request.project_id);

    let delivered = state
        .rooms
        .broadcast(
            room,
            ServerEvent::MessageDeleted {
                message_id: request.message_id,
                project_id: request.project_id,
                deleted_by: request.deleted_by,
            },
            None,
        )
        .await;

    tracing::info!(
        room_id = %room,
        message_id = request.message_id,
        deleted_by = request.deleted_by,
        delivered,
        "Message deletion pushed to room"
    );

    (StatusCode::OK, Json(ModerationResponse { delivered }))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyUserRequest {
    user_id: UserId,
    event: ServerEvent,
}

#[derive(Debug, Serialize)]
struct NotifyResponse {
    delivered: bool,
}

/// Push an event to every live connection of one user
///
/// POST /notify/user
///
/// Out-of-band ingress for collaborators that target a user rather than a
/// room. `delivered: false` means the user is offline; nothing is queued.
async fn notify_user(
    State(state): State<ChatState>,
    Json(request): Json<NotifyUserRequest>,
) -> impl IntoResponse {
    let delivered = state
        .notifier
        .notify_user(request.user_id, request.event)
        .await;

    tracing::debug!(
        user_id = request.user_id,
        delivered,
        "Targeted notification pushed"
    );

    (StatusCode::OK, Json(NotifyResponse { delivered }))
}

// ============================================================================
// Tests
// ============================================================================

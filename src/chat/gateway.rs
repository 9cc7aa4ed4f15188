//! Connection gateway for project chat
//!
//! Authenticates the websocket handshake, runs the per-connection event
//! loop and guarantees presence/membership cleanup on any disconnect path.
//!
//! WebSocket URL: ws(s)://{host}/ws?token={bearer}

use axum::{
    Json,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::api::ChatState;
use super::authorizer::JoinError;
use super::broker::MessageSubmission;
use super::presence::ConnectionHandle;
use super::protocol::{ApiError, ClientEvent, RoomName, ServerEvent};
use crate::auth::VerifyError;
use crate::store::{StoreError, UserProfile};

// ============================================================================
// Constants
// ============================================================================

/// Channel buffer size for outgoing events
const OUTGOING_BUFFER_SIZE: usize = 64;

// ============================================================================
// Handshake
// ============================================================================

/// Query parameters accepted on the websocket handshake.
/// Browser websocket clients cannot set headers, so the token may arrive
/// as `?token=...` instead of an Authorization header.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

/// Handshake rejection reasons, reported before the upgrade
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Authentication token required")]
    NoToken,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Authentication token expired")]
    ExpiredToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HandshakeError::NoToken => (StatusCode::UNAUTHORIZED, ApiError::no_token()),
            HandshakeError::InvalidToken => (StatusCode::UNAUTHORIZED, ApiError::invalid_token()),
            HandshakeError::ExpiredToken => (StatusCode::UNAUTHORIZED, ApiError::expired_token()),
            HandshakeError::UserNotFound => (StatusCode::UNAUTHORIZED, ApiError::user_not_found()),
            HandshakeError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal("Internal server error"),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Extract a bearer token from the Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Verify the handshake credential and resolve the user behind it
async fn authenticate(state: &ChatState, token: Option<&str>) -> Result<UserProfile, HandshakeError> {
    let token = token.ok_or(HandshakeError::NoToken)?;

    let user_id = state.verifier.verify_user(token).map_err(|err| match err {
        VerifyError::Expired => HandshakeError::ExpiredToken,
        _ => HandshakeError::InvalidToken,
    })?;

    state
        .users
        .find_user(user_id)
        .await?
        .ok_or(HandshakeError::UserNotFound)
}

/// WebSocket upgrade handler
///
/// The credential is verified and the user resolved before the upgrade;
/// a bad handshake gets an HTTP 401 with a machine-readable code instead
/// of a websocket session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    State(state): State<ChatState>,
) -> Response {
    let token = bearer_token(&headers).or(query.token.as_deref());

    match authenticate(&state, token).await {
        Ok(profile) => {
            ws.on_upgrade(move |socket| handle_socket(socket, profile, state))
        }
        Err(err) => {
            tracing::warn!(reason = %err, "WebSocket handshake rejected");
            err.into_response()
        }
    }
}

// ============================================================================
// Connection Loop
// ============================================================================

/// Handle an authenticated WebSocket connection
async fn handle_socket(socket: WebSocket, profile: UserProfile, state: ChatState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel feeding this client's outbound frames
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTGOING_BUFFER_SIZE);

    // Forwarding task draining the channel into the websocket sink
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                }
            }
        }
    });

    let handle = ConnectionHandle::new(
        profile.id,
        profile.username,
        profile.profile_picture_url,
        tx,
    );
    let connection_id = handle.connection_id;
    let user_id = handle.user_id;

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket connection established"
    );

    let mut session = ConnectionSession::new(handle, state);

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let text_str: &str = &text;
                match serde_json::from_str::<ClientEvent>(text_str) {
                    Ok(event) => session.handle_event(event).await,
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            "Invalid event format: {}",
                            e
                        );
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!("Ignoring binary frame");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Axum answers pings itself
            }
            Ok(Message::Close(_)) => {
                tracing::info!(
                    connection_id = %connection_id,
                    user_id = %user_id,
                    "Client closed connection"
                );
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    session.cleanup();
    send_task.abort();

    tracing::info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket connection closed"
    );
}

// ============================================================================
// Connection Session
// ============================================================================

/// State for a single WebSocket connection
struct ConnectionSession {
    handle: ConnectionHandle,
    state: ChatState,
    cleaned_up: bool,
}

impl ConnectionSession {
    /// Create the session and register the connection as present
    fn new(handle: ConnectionHandle, state: ChatState) -> Self {
        state.presence.register(handle.clone());

        Self {
            handle,
            state,
            cleaned_up: false,
        }
    }

    /// Dispatch one incoming client event
    async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom { room_name } => self.handle_join(&room_name).await,
            ClientEvent::LeaveRoom { room_name } => self.handle_leave(&room_name),
            ClientEvent::Typing { room_name } => {
                if let Ok(room) = room_name.parse::<RoomName>() {
                    self.state.typing.started(room, &self.handle).await;
                }
            }
            ClientEvent::StopTyping { room_name } => {
                if let Ok(room) = room_name.parse::<RoomName>() {
                    self.state.typing.stopped(room, &self.handle).await;
                }
            }
            ClientEvent::SendMessage {
                project_id,
                room_name,
                message_type,
                content,
                file_name,
                file_url,
                mime_type,
                file_size,
            } => {
                self.handle_send(MessageSubmission {
                    project_id,
                    room_name,
                    message_type,
                    content,
                    file_name,
                    file_url,
                    mime_type,
                    file_size,
                })
                .await;
            }
        }
    }

    /// Authorize and execute a room join, then ack either way.
    /// A failed join leaves membership untouched.
    async fn handle_join(&self, room_name: &str) {
        let result = self.authorize_join(room_name).await;

        let ack = match result {
            Ok(room) => {
                self.state.rooms.join(room, self.handle.connection_id);
                tracing::info!(
                    room_id = %room,
                    user_id = %self.handle.user_id,
                    "Connection joined room"
                );
                ServerEvent::join_success(room)
            }
            Err(err) => {
                tracing::info!(
                    user_id = %self.handle.user_id,
                    room_name,
                    reason = %err,
                    "Room join refused"
                );
                ServerEvent::join_failed(err.code(), err.to_string())
            }
        };

        self.handle.deliver(ack).await;
    }

    async fn authorize_join(&self, room_name: &str) -> Result<RoomName, JoinError> {
        let room: RoomName = room_name.parse().map_err(|_| JoinError::InvalidRoomName)?;

        self.state
            .authorizer
            .authorize(self.handle.user_id, room.project_id())
            .await?;

        Ok(room)
    }

    /// Leave a room. Fire-and-forget: no ack, leaving a room never joined
    /// (or a malformed name) is a no-op.
    fn handle_leave(&self, room_name: &str) {
        if let Ok(room) = room_name.parse::<RoomName>() {
            self.state.rooms.leave(room, &self.handle.connection_id);
        }
    }

    /// Run a submission through the broker and ack the outcome
    async fn handle_send(&self, submission: MessageSubmission) {
        let ack = match self.state.broker.submit(self.handle.user_id, submission).await {
            Ok(message) => ServerEvent::message_success(message),
            Err(err) => ServerEvent::message_failed(err.code(), err.to_string()),
        };

        self.handle.deliver(ack).await;
    }

    /// Cleanup when the connection closes: drop all room memberships, then
    /// the presence entry. Idempotent.
    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        let left = self.state.rooms.leave_all(&self.handle.connection_id);
        self.state.presence.unregister(&self.handle.connection_id);

        tracing::debug!(
            connection_id = %self.handle.connection_id,
            user_id = %self.handle.user_id,
            rooms_left = left.len(),
            "Connection cleaned up"
        );
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        // Ensure cleanup happens on drop
        self.cleanup();
    }
}

// ============================================================================
// Tests
// ============================================================================

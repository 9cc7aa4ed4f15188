//! Real-time project chat
//!
//! One WebSocket connection per client tab, JSON events tagged by an
//! `event` field. Rooms map one-to-one onto projects; membership is
//! checked against the store on every join and messages are persisted
//! before they fan out.

pub mod api;
pub mod authorizer;
pub mod broker;
pub mod gateway;
pub mod notify;
pub mod presence;
pub mod protocol;
pub mod rooms;
pub mod typing;

pub use api::{ChatState, chat_router};
pub use authorizer::{JoinError, RoomAuthorizer};
pub use broker::{MessageBroker, MessageSubmission, SubmitError};
pub use notify::TargetedNotifier;
pub use presence::{ConnectionHandle, ConnectionId, PresenceRegistry};
pub use protocol::{ChatErrorCode, ChatMessage, ClientEvent, RoomName, ServerEvent};
pub use rooms::RoomSessionManager;
pub use typing::TypingRelay;

//! Huddle - Real-time project messaging
//!
//! WebSocket chat service for the huddle collaboration platform. Clients
//! authenticate with platform-issued bearer tokens, join per-project rooms,
//! and exchange persisted messages and volatile typing signals.

pub mod auth;
pub mod chat;
pub mod config;
pub mod store;

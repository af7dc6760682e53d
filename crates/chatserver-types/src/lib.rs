//! Shared domain types for the chat server.
//!
//! Users, chats, memberships and messages, the error taxonomy of the chat
//! operations engine, and configuration types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;

//! Infrastructure layer for the chat server.
//!
//! Contains the SQLite implementation of the `ChatRepository` trait defined
//! in `chatserver-core` (the transactional chat operations engine), the
//! statement builder it runs, and the configuration file loader.

pub mod config;
pub mod sqlite;

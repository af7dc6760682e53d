//! SQLite storage layer.
//!
//! The chat repository backed by SQLite with WAL mode and split read/write
//! connection pools, plus the statement builder it runs.

pub mod chat;
pub mod pool;
pub mod statement;

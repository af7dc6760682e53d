//! Chat service logic and repository trait definitions.
//!
//! This crate defines the `ChatRepository` port that the infrastructure
//! layer implements, and the `ChatService` that callers go through. It
//! depends only on `chatserver-types` -- never on `chatserver-infra` or any
//! database crate.

pub mod chat;

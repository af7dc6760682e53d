//! ChatRepository trait definition.
//!
//! The three write operations are transactional: each opens one transaction,
//! runs every statement it needs inside it, and either commits or rolls back
//! before returning. They take the caller's `CallContext` and bound the
//! transaction body by it, but never the commit: `DeadlineExceeded` or
//! `Cancelled` from a write means the transaction was rolled back. Dropping a
//! returned future before it completes must also leave no partial state
//! behind.

use crate::chat::context::CallContext;
use chatserver_types::chat::{Chat, ChatId, MessageView, NewMessage, User};
use chatserver_types::error::ChatError;

/// Repository trait for chat persistence.
///
/// Implementations live in chatserver-infra (`SqliteChatRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatRepository: Send + Sync {
    /// Upsert every username, create a chat, and add each distinct user as a
    /// member. Returns the new chat's id.
    fn create_chat(
        &self,
        usernames: &[String],
        ctx: &CallContext,
    ) -> impl std::future::Future<Output = Result<ChatId, ChatError>> + Send;

    /// Store a message from `message.from` in the highest-id chat the sender
    /// belongs to.
    fn send_message(
        &self,
        message: &NewMessage,
        ctx: &CallContext,
    ) -> impl std::future::Future<Output = Result<(), ChatError>> + Send;

    /// Delete a chat together with its memberships and messages.
    /// Returns `ChatNotFound` when no chat has this id.
    fn delete_chat(
        &self,
        chat_id: ChatId,
        ctx: &CallContext,
    ) -> impl std::future::Future<Output = Result<(), ChatError>> + Send;

    /// Most recent messages across all chats, newest first.
    fn recent_messages(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<MessageView>, ChatError>> + Send;

    /// Get a chat by id.
    fn get_chat(
        &self,
        chat_id: ChatId,
    ) -> impl std::future::Future<Output = Result<Option<Chat>, ChatError>> + Send;

    /// Members of a chat, ordered by user id.
    fn chat_members(
        &self,
        chat_id: ChatId,
    ) -> impl std::future::Future<Output = Result<Vec<User>, ChatError>> + Send;

    /// Look up a user by exact (case-sensitive) username.
    fn find_user(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, ChatError>> + Send;
}

//! Chat service: input validation plus deadline and cancellation handling
//! around every repository call.
//!
//! The repository owns all transactional logic, including where the deadline
//! stops applying (never to a commit). The service only decides whether a
//! call may reach the store at all, and bounds the read-only queries. Nothing
//! is retried here; retries are the caller's business.

use std::future::Future;

use chatserver_types::chat::{Chat, ChatId, MessageView, NewMessage, User};
use chatserver_types::error::ChatError;
use tracing::{debug, error};

use crate::chat::context::CallContext;
use crate::chat::repository::ChatRepository;

/// Upper bound for `recent_messages`.
pub const MAX_RECENT_MESSAGES: u32 = 100;

/// Front door to the chat operations engine.
///
/// Generic over `ChatRepository` so chatserver-core never depends on
/// chatserver-infra.
pub struct ChatService<R: ChatRepository> {
    repo: R,
}

impl<R: ChatRepository> ChatService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Create a chat for `usernames`, upserting each user.
    ///
    /// Rejects an empty list and blank usernames before any transaction is
    /// opened. Usernames are case-sensitive and used exactly as given.
    pub async fn create_chat(
        &self,
        usernames: &[String],
        ctx: &CallContext,
    ) -> Result<ChatId, ChatError> {
        validate_usernames(usernames)?;
        ctx.ensure_live("create_chat")?;
        logged("create_chat", self.repo.create_chat(usernames, ctx)).await
    }

    /// Send a message from an existing user to their most recent chat.
    pub async fn send_message(
        &self,
        message: &NewMessage,
        ctx: &CallContext,
    ) -> Result<(), ChatError> {
        validate_username(&message.from)?;
        ctx.ensure_live("send_message")?;
        logged("send_message", self.repo.send_message(message, ctx)).await
    }

    /// Delete a chat and everything hanging off it.
    pub async fn delete_chat(&self, chat_id: ChatId, ctx: &CallContext) -> Result<(), ChatError> {
        ctx.ensure_live("delete_chat")?;
        logged("delete_chat", self.repo.delete_chat(chat_id, ctx)).await
    }

    /// Most recent messages, newest first. `limit` is clamped to
    /// `1..=MAX_RECENT_MESSAGES`.
    pub async fn recent_messages(
        &self,
        limit: u32,
        ctx: &CallContext,
    ) -> Result<Vec<MessageView>, ChatError> {
        let limit = limit.clamp(1, MAX_RECENT_MESSAGES);
        logged(
            "recent_messages",
            ctx.run("recent_messages", self.repo.recent_messages(limit)),
        )
        .await
    }

    pub async fn get_chat(&self, chat_id: ChatId, ctx: &CallContext) -> Result<Chat, ChatError> {
        logged("get_chat", ctx.run("get_chat", self.repo.get_chat(chat_id)))
            .await?
            .ok_or(ChatError::ChatNotFound(chat_id))
    }

    /// Members of an existing chat. `ChatNotFound` if the chat does not exist.
    pub async fn chat_members(
        &self,
        chat_id: ChatId,
        ctx: &CallContext,
    ) -> Result<Vec<User>, ChatError> {
        let members = ctx.run("chat_members", async {
            if self.repo.get_chat(chat_id).await?.is_none() {
                return Err(ChatError::ChatNotFound(chat_id));
            }
            self.repo.chat_members(chat_id).await
        });
        logged("chat_members", members).await
    }

    pub async fn find_user(
        &self,
        username: &str,
        ctx: &CallContext,
    ) -> Result<Option<User>, ChatError> {
        logged("find_user", ctx.run("find_user", self.repo.find_user(username))).await
    }
}

fn validate_usernames(usernames: &[String]) -> Result<(), ChatError> {
    if usernames.is_empty() {
        return Err(ChatError::EmptyParticipants);
    }
    usernames.iter().try_for_each(|u| validate_username(u))
}

fn validate_username(username: &str) -> Result<(), ChatError> {
    if username.trim().is_empty() {
        return Err(ChatError::InvalidUsername(username.to_string()));
    }
    Ok(())
}

async fn logged<T, F>(operation: &'static str, fut: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, ChatError>>,
{
    let outcome = fut.await;

    match &outcome {
        Err(e) if e.is_caller_error() => debug!(operation, error = %e, "chat operation rejected"),
        Err(e) => error!(operation, error = %e, "chat operation failed"),
        Ok(_) => debug!(operation, "chat operation completed"),
    }

    outcome
}

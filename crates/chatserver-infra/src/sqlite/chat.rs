//! SQLite chat repository: the transactional chat operations engine.
//!
//! Implements `ChatRepository` from `chatserver-core` using sqlx with split
//! read/write pools. Every write operation owns exactly one transaction on
//! the writer pool and ends it before returning: commit on success, explicit
//! rollback on every error path, including a deadline or cancellation hit
//! while the body runs. If the whole future is dropped mid-flight, sqlx rolls
//! the open transaction back when it is dropped.

use std::collections::HashSet;

use chatserver_core::chat::context::CallContext;
use chatserver_core::chat::repository::ChatRepository;
use chatserver_types::chat::{Chat, ChatId, MessageId, MessageView, NewMessage, User, UserId};
use chatserver_types::error::ChatError;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, warn};

use super::pool::DatabasePool;
use super::statement;

type Tx = Transaction<'static, Sqlite>;

/// SQLite-backed implementation of `ChatRepository`.
#[derive(Clone)]
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Tx, ChatError> {
        self.pool
            .writer
            .begin()
            .await
            .map_err(|e| ChatError::TransactionBegin(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct UserRow {
    id: i64,
    username: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get(0)?,
            username: row.try_get(1)?,
        })
    }

    fn into_user(self) -> User {
        User {
            id: UserId(self.id),
            username: self.username,
        }
    }
}

struct ChatRow {
    id: i64,
    created_at: String,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_chat(self) -> Result<Chat, ChatError> {
        Ok(Chat {
            id: ChatId(self.id),
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

/// Message joined with its sender's username. Columns are read by position
/// because they come from a join.
struct MessageViewRow {
    id: i64,
    chat_id: i64,
    username: String,
    text: String,
    timestamp: String,
}

impl MessageViewRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get(0)?,
            chat_id: row.try_get(1)?,
            username: row.try_get(2)?,
            text: row.try_get(3)?,
            timestamp: row.try_get(4)?,
        })
    }

    fn into_view(self) -> Result<MessageView, ChatError> {
        Ok(MessageView {
            id: MessageId(self.id),
            chat_id: ChatId(self.chat_id),
            sender: self.username,
            text: self.text,
            timestamp: parse_datetime(&self.timestamp)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ChatError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ChatError::Lookup {
            stage: "decode timestamp",
            reason: format!("invalid datetime '{s}': {e}"),
        })
}

/// Fixed-width UTC form, so text order equals time order.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn lookup(stage: &'static str) -> impl FnOnce(sqlx::Error) -> ChatError {
    move |e| ChatError::Lookup {
        stage,
        reason: e.to_string(),
    }
}

/// Commit on `Ok`, roll back on `Err`. The operation's error always wins over
/// a rollback failure.
///
/// The context is checked once before committing; past that point the commit
/// runs to completion and its real outcome is reported, so a deadline or
/// cancellation error always means the transaction was rolled back.
///
/// A failed commit consumes the transaction without closing it; sqlx then
/// rolls it back on drop.
async fn finish<T>(
    tx: Tx,
    ctx: &CallContext,
    operation: &'static str,
    result: Result<T, ChatError>,
) -> Result<T, ChatError> {
    let result = result.and_then(|value| ctx.ensure_live(operation).map(|()| value));

    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| ChatError::Commit(e.to_string()))?;
            Ok(value)
        }
        Err(err) => {
            match tx.rollback().await {
                Ok(()) => warn!(operation, error = %err, "transaction rolled back"),
                Err(rollback_err) => warn!(
                    operation,
                    error = %err,
                    rollback_error = %rollback_err,
                    "transaction rollback failed"
                ),
            }
            Err(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction bodies
// ---------------------------------------------------------------------------

async fn create_chat_in(tx: &mut Tx, usernames: &[String]) -> Result<ChatId, ChatError> {
    let mut user_ids = Vec::with_capacity(usernames.len());
    for username in usernames {
        let stmt = statement::upsert_user(username)?;
        let id: i64 = stmt
            .query()
            .fetch_one(&mut **tx)
            .await
            .and_then(|row| row.try_get("id"))
            .map_err(|e| ChatError::UpsertFailed {
                username: username.clone(),
                reason: e.to_string(),
            })?;
        debug!(username = %username, user_id = id, "user resolved");
        user_ids.push(UserId(id));
    }

    let stmt = statement::insert_chat()?;
    let chat_id: i64 = stmt
        .query()
        .fetch_one(&mut **tx)
        .await
        .and_then(|row| row.try_get("id"))
        .map_err(|e| ChatError::ChatInsertFailed(e.to_string()))?;
    let chat_id = ChatId(chat_id);

    // One membership per distinct user, in first-seen order.
    let mut seen = HashSet::with_capacity(user_ids.len());
    user_ids.retain(|id| seen.insert(*id));

    for user_id in user_ids {
        let stmt = statement::insert_membership(chat_id, user_id)?;
        stmt.query()
            .execute(&mut **tx)
            .await
            .map_err(|e| ChatError::MembershipInsertFailed {
                user_id,
                reason: e.to_string(),
            })?;
    }

    Ok(chat_id)
}

async fn send_message_in(tx: &mut Tx, message: &NewMessage) -> Result<(), ChatError> {
    let stmt = statement::select_user_by_name(&message.from)?;
    let sender_id: i64 = stmt
        .query()
        .fetch_optional(&mut **tx)
        .await
        .map_err(lookup("resolve sender"))?
        .ok_or_else(|| ChatError::SenderNotFound(message.from.clone()))?
        .try_get("id")
        .map_err(lookup("resolve sender"))?;
    let sender_id = UserId(sender_id);

    let stmt = statement::select_latest_chat_for_user(sender_id)?;
    let chat_id: i64 = stmt
        .query()
        .fetch_optional(&mut **tx)
        .await
        .map_err(lookup("resolve chat for sender"))?
        .ok_or_else(|| ChatError::NoChatForSender(message.from.clone()))?
        .try_get("chat_id")
        .map_err(lookup("resolve chat for sender"))?;
    let chat_id = ChatId(chat_id);

    let stmt = statement::insert_message(chat_id, sender_id, &message.text, &message.timestamp)?;
    let message_id: i64 = stmt
        .query()
        .fetch_one(&mut **tx)
        .await
        .and_then(|row| row.try_get("id"))
        .map_err(|e| ChatError::MessageInsertFailed(e.to_string()))?;

    debug!(%chat_id, %sender_id, message_id, "message stored");
    Ok(())
}

/// Memberships and messages go with the chat through `ON DELETE CASCADE`.
async fn delete_chat_in(tx: &mut Tx, chat_id: ChatId) -> Result<(), ChatError> {
    let stmt = statement::delete_chat(chat_id)?;
    let result = stmt
        .query()
        .execute(&mut **tx)
        .await
        .map_err(|e| ChatError::DeleteFailed {
            chat_id,
            reason: e.to_string(),
        })?;

    if result.rows_affected() == 0 {
        return Err(ChatError::ChatNotFound(chat_id));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    #[tracing::instrument(skip(self, ctx), fields(participants = usernames.len()))]
    async fn create_chat(
        &self,
        usernames: &[String],
        ctx: &CallContext,
    ) -> Result<ChatId, ChatError> {
        if usernames.is_empty() {
            return Err(ChatError::EmptyParticipants);
        }

        let mut tx = ctx.run("create_chat", self.begin()).await?;
        let result = ctx.run("create_chat", create_chat_in(&mut tx, usernames)).await;
        let chat_id = finish(tx, ctx, "create_chat", result).await?;

        debug!(%chat_id, "chat created");
        Ok(chat_id)
    }

    #[tracing::instrument(skip(self, message, ctx), fields(from = %message.from))]
    async fn send_message(
        &self,
        message: &NewMessage,
        ctx: &CallContext,
    ) -> Result<(), ChatError> {
        let mut tx = ctx.run("send_message", self.begin()).await?;
        let result = ctx.run("send_message", send_message_in(&mut tx, message)).await;
        finish(tx, ctx, "send_message", result).await
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn delete_chat(&self, chat_id: ChatId, ctx: &CallContext) -> Result<(), ChatError> {
        let mut tx = ctx.run("delete_chat", self.begin()).await?;
        let result = ctx.run("delete_chat", delete_chat_in(&mut tx, chat_id)).await;
        finish(tx, ctx, "delete_chat", result).await?;

        debug!(%chat_id, "chat deleted");
        Ok(())
    }

    async fn recent_messages(&self, limit: u32) -> Result<Vec<MessageView>, ChatError> {
        let stmt = statement::select_recent_messages(limit)?;
        let rows = stmt
            .query()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(lookup("list recent messages"))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let message_row =
                MessageViewRow::from_row(row).map_err(lookup("list recent messages"))?;
            messages.push(message_row.into_view()?);
        }

        Ok(messages)
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, ChatError> {
        let stmt = statement::select_chat(chat_id)?;
        let row = stmt
            .query()
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(lookup("get chat"))?;

        match row {
            Some(row) => {
                let chat_row = ChatRow::from_row(&row).map_err(lookup("get chat"))?;
                Ok(Some(chat_row.into_chat()?))
            }
            None => Ok(None),
        }
    }

    async fn chat_members(&self, chat_id: ChatId) -> Result<Vec<User>, ChatError> {
        let stmt = statement::select_chat_members(chat_id)?;
        let rows = stmt
            .query()
            .fetch_all(&self.pool.reader)
            .await
            .map_err(lookup("list chat members"))?;

        rows.iter()
            .map(|row| {
                UserRow::from_row(row)
                    .map(UserRow::into_user)
                    .map_err(lookup("list chat members"))
            })
            .collect()
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, ChatError> {
        let stmt = statement::select_user_by_name(username)?;
        let row = stmt
            .query()
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(lookup("find user"))?;

        row.map(|row| {
            UserRow::from_row(&row)
                .map(UserRow::into_user)
                .map_err(lookup("find user"))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;
    use chatserver_core::chat::service::ChatService;
    use std::time::Duration;

    async fn test_pool_at() -> (DatabasePool, String) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        (DatabasePool::new(&url).await.unwrap(), url)
    }

    async fn test_pool() -> DatabasePool {
        test_pool_at().await.0
    }

    fn ctx() -> CallContext {
        CallContext::new(Duration::from_secs(5))
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn count(pool: &DatabasePool, sql: &str) -> i64 {
        let row: (i64,) = sqlx::query_as(sql).fetch_one(&pool.writer).await.unwrap();
        row.0
    }

    async fn user_id(pool: &DatabasePool, username: &str) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_create_send_delete_scenario() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        let chat_id = repo.create_chat(&names(&["Alan", "Browdi"]), &ctx()).await.unwrap();

        let alan = user_id(&pool, "Alan").await;
        let browdi = user_id(&pool, "Browdi").await;
        assert_ne!(alan, browdi);

        let members: Vec<(i64, i64)> =
            sqlx::query_as("SELECT chat_id, user_id FROM chat_users ORDER BY user_id")
                .fetch_all(&pool.writer)
                .await
                .unwrap();
        assert_eq!(members, vec![(chat_id.0, alan), (chat_id.0, browdi)]);

        let sent_at = ts("2025-03-01T12:00:00Z");
        repo.send_message(&NewMessage::new("Alan", "hi", sent_at), &ctx())
            .await
            .unwrap();

        let stored: Vec<(i64, i64, String, String)> =
            sqlx::query_as("SELECT chat_id, sender_id, text, timestamp FROM messages")
                .fetch_all(&pool.writer)
                .await
                .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, chat_id.0);
        assert_eq!(stored[0].1, alan);
        assert_eq!(stored[0].2, "hi");
        assert_eq!(parse_datetime(&stored[0].3).unwrap(), sent_at);

        repo.delete_chat(chat_id, &ctx()).await.unwrap();
        let err = repo.delete_chat(chat_id, &ctx()).await.unwrap_err();
        assert!(matches!(err, ChatError::ChatNotFound(id) if id == chat_id));
    }

    #[tokio::test]
    async fn test_repeated_usernames_reuse_user_ids() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        repo.create_chat(&names(&["Alan", "Browdi"]), &ctx()).await.unwrap();
        let alan_before = user_id(&pool, "Alan").await;

        repo.create_chat(&names(&["Carla", "Alan"]), &ctx()).await.unwrap();
        assert_eq!(user_id(&pool, "Alan").await, alan_before);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 3);
    }

    #[tokio::test]
    async fn test_duplicate_username_in_one_call_yields_one_membership() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        let chat_id = repo
            .create_chat(&names(&["Alan", "Alan", "Browdi", "Alan"]), &ctx())
            .await
            .unwrap();

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 2);
        let members = repo.chat_members(chat_id).await.unwrap();
        let usernames: Vec<&str> = members.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(usernames, vec!["Alan", "Browdi"]);
    }

    #[tokio::test]
    async fn test_usernames_are_case_sensitive() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        repo.create_chat(&names(&["alan", "Alan"]), &ctx()).await.unwrap();
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 2);
        assert!(repo.find_user("ALAN").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_membership_leaves_no_partial_state() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        sqlx::query(
            "CREATE TRIGGER reject_browdi BEFORE INSERT ON chat_users
             WHEN NEW.user_id = (SELECT id FROM users WHERE username = 'Browdi')
             BEGIN SELECT RAISE(ABORT, 'membership rejected'); END",
        )
        .execute(&pool.writer)
        .await
        .unwrap();

        let err = repo
            .create_chat(&names(&["Alan", "Browdi", "Carla"]), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MembershipInsertFailed { .. }), "{err}");
        assert!(err.to_string().contains("membership rejected"));

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM chats").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM chat_users").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM users").await, 0);

        // The writer connection is free again after the rollback.
        let chat_id = repo.create_chat(&names(&["Alan"]), &ctx()).await.unwrap();
        assert_eq!(repo.chat_members(chat_id).await.unwrap().len(), 1);
    }

    /// Both calls share the single writer connection, so their transactions
    /// run one after the other; the second upsert finds the committed row.
    #[tokio::test]
    async fn test_concurrent_upserts_resolve_to_one_user() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());
        let other = repo.clone();

        let usernames = names(&["Zed"]);
        let (first_ctx, second_ctx) = (ctx(), ctx());
        let (a, b) = tokio::join!(
            repo.create_chat(&usernames, &first_ctx),
            other.create_chat(&usernames, &second_ctx)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);

        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM users WHERE username = 'Zed'").await,
            1
        );
        let zed = repo.find_user("Zed").await.unwrap().unwrap();
        assert_eq!(repo.chat_members(a).await.unwrap(), vec![zed.clone()]);
        assert_eq!(repo.chat_members(b).await.unwrap(), vec![zed]);
    }

    #[tokio::test]
    async fn test_message_routes_to_highest_chat_id() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        sqlx::query("INSERT INTO users (username) VALUES ('Alan')")
            .execute(&pool.writer)
            .await
            .unwrap();
        let alan = user_id(&pool, "Alan").await;
        for chat in [3_i64, 7, 5] {
            sqlx::query("INSERT INTO chats (id) VALUES (?)")
                .bind(chat)
                .execute(&pool.writer)
                .await
                .unwrap();
            sqlx::query("INSERT INTO chat_users (chat_id, user_id) VALUES (?, ?)")
                .bind(chat)
                .bind(alan)
                .execute(&pool.writer)
                .await
                .unwrap();
        }

        repo.send_message(&NewMessage::new("Alan", "where am I?", Utc::now()), &ctx())
            .await
            .unwrap();

        let chats: Vec<(i64,)> = sqlx::query_as("SELECT chat_id FROM messages")
            .fetch_all(&pool.writer)
            .await
            .unwrap();
        assert_eq!(chats, vec![(7,)]);
    }

    #[tokio::test]
    async fn test_newest_chat_wins_after_second_create() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        let first = repo.create_chat(&names(&["Alan", "Browdi"]), &ctx()).await.unwrap();
        let second = repo.create_chat(&names(&["Alan"]), &ctx()).await.unwrap();
        assert!(second > first);

        repo.send_message(&NewMessage::new("Browdi", "one", Utc::now()), &ctx())
            .await
            .unwrap();
        repo.send_message(&NewMessage::new("Alan", "two", Utc::now()), &ctx())
            .await
            .unwrap();

        let recent = repo.recent_messages(10).await.unwrap();
        let by_text = |t: &str| recent.iter().find(|m| m.text == t).unwrap().chat_id;
        assert_eq!(by_text("one"), first);
        assert_eq!(by_text("two"), second);
    }

    #[tokio::test]
    async fn test_unknown_sender_writes_nothing() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());
        repo.create_chat(&names(&["Alan"]), &ctx()).await.unwrap();

        let err = repo
            .send_message(&NewMessage::new("Twitter", "No idea", Utc::now()), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::SenderNotFound(ref u) if u == "Twitter"));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM messages").await, 0);
    }

    #[tokio::test]
    async fn test_sender_without_chat_is_reported() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        let chat_id = repo.create_chat(&names(&["Alan"]), &ctx()).await.unwrap();
        repo.delete_chat(chat_id, &ctx()).await.unwrap();

        let err = repo
            .send_message(&NewMessage::new("Alan", "anyone?", Utc::now()), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NoChatForSender(ref u) if u == "Alan"));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM messages").await, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_chat_mutates_nothing() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());
        let chat_id = repo.create_chat(&names(&["Alan", "Browdi"]), &ctx()).await.unwrap();

        let err = repo.delete_chat(ChatId(chat_id.0 + 100), &ctx()).await.unwrap_err();
        assert!(matches!(err, ChatError::ChatNotFound(_)));
        assert!(err.is_caller_error());

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM chats").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM chat_users").await, 2);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_memberships_and_messages() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        let kept = repo.create_chat(&names(&["Browdi", "Carla"]), &ctx()).await.unwrap();
        repo.send_message(&NewMessage::new("Browdi", "stays", Utc::now()), &ctx())
            .await
            .unwrap();
        let doomed = repo.create_chat(&names(&["Alan", "Browdi"]), &ctx()).await.unwrap();
        repo.send_message(&NewMessage::new("Alan", "goes", Utc::now()), &ctx())
            .await
            .unwrap();

        repo.delete_chat(doomed, &ctx()).await.unwrap();

        assert!(repo.get_chat(doomed).await.unwrap().is_none());
        assert!(repo.get_chat(kept).await.unwrap().is_some());
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM chat_users WHERE chat_id NOT IN (SELECT id FROM chats)").await,
            0
        );
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM messages WHERE chat_id NOT IN (SELECT id FROM chats)").await,
            0
        );
        assert_eq!(repo.chat_members(kept).await.unwrap().len(), 2);

        let texts: Vec<String> = repo
            .recent_messages(10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["stays".to_string()]);

        // Users outlive their chats.
        assert!(repo.find_user("Alan").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_participant_list_is_rejected() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        let err = repo.create_chat(&[], &ctx()).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyParticipants));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM chats").await, 0);
    }

    #[tokio::test]
    async fn test_recent_messages_newest_first_with_sender() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());
        let chat_id = repo.create_chat(&names(&["Alan", "Browdi"]), &ctx()).await.unwrap();

        repo.send_message(&NewMessage::new("Alan", "first", ts("2025-03-01T12:00:00Z")), &ctx())
            .await
            .unwrap();
        repo.send_message(&NewMessage::new("Browdi", "third", ts("2025-03-01T12:00:02+00:00")), &ctx())
            .await
            .unwrap();
        repo.send_message(&NewMessage::new("Alan", "second", ts("2025-03-01T14:00:01+02:00")), &ctx())
            .await
            .unwrap();

        let recent = repo.recent_messages(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "third");
        assert_eq!(recent[0].sender, "Browdi");
        assert_eq!(recent[0].chat_id, chat_id);
        assert_eq!(recent[1].text, "second");
        assert_eq!(recent[1].timestamp, ts("2025-03-01T12:00:01Z"));
    }

    #[tokio::test]
    async fn test_get_chat_and_find_user() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());

        assert!(repo.get_chat(ChatId(1)).await.unwrap().is_none());
        assert!(repo.find_user("Alan").await.unwrap().is_none());

        let chat_id = repo.create_chat(&names(&["Alan"]), &ctx()).await.unwrap();
        let chat = repo.get_chat(chat_id).await.unwrap().unwrap();
        assert_eq!(chat.id, chat_id);
        assert!(chat.created_at <= Utc::now());

        let alan = repo.find_user("Alan").await.unwrap().unwrap();
        assert_eq!(alan.id.0, user_id(&pool, "Alan").await);
    }

    #[test]
    fn test_format_datetime_is_fixed_width_utc() {
        let a = format_datetime(&ts("2025-03-01T12:00:00Z"));
        let b = format_datetime(&ts("2025-03-01T13:00:00.5+01:00"));
        assert_eq!(a, "2025-03-01T12:00:00.000000Z");
        assert_eq!(b, "2025-03-01T12:00:00.500000Z");
        assert!(a < b);
    }

    /// Two independent connections upsert the same username while the first
    /// one holds its write transaction open. The unique index plus
    /// `ON CONFLICT` makes the second resolve to the first one's id.
    #[tokio::test]
    async fn test_upsert_race_across_connections() {
        use sqlx::ConnectOptions;
        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        let (pool, url) = test_pool_at().await;
        let options = SqliteConnectOptions::from_str(&url)
            .unwrap()
            .busy_timeout(Duration::from_secs(5));
        let mut first = options.connect().await.unwrap();
        let mut second = options.connect().await.unwrap();

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut first)
            .await
            .unwrap();
        let stmt = statement::upsert_user("Zed").unwrap();
        let first_id: i64 = stmt
            .query()
            .fetch_one(&mut first)
            .await
            .unwrap()
            .get("id");

        let racing = statement::upsert_user("Zed").unwrap();
        let (second_row, ()) = tokio::join!(racing.query().fetch_one(&mut second), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            sqlx::query("COMMIT").execute(&mut first).await.unwrap();
        });
        let second_id: i64 = second_row.unwrap().get("id");

        assert_eq!(first_id, second_id);
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM users WHERE username = 'Zed'").await,
            1
        );
    }

    #[tokio::test]
    async fn test_expired_context_stores_nothing() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());
        repo.create_chat(&names(&["Alan"]), &ctx()).await.unwrap();

        let expired = CallContext::new(Duration::ZERO);
        let err = repo
            .send_message(&NewMessage::new("Alan", "too late", Utc::now()), &expired)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DeadlineExceeded { operation: "send_message" }));

        let err = repo
            .create_chat(&names(&["Browdi"]), &expired)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::DeadlineExceeded { operation: "create_chat" }));

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM messages").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM chats").await, 1);
        assert!(repo.find_user("Browdi").await.unwrap().is_none());
    }

    /// Deadlines short enough to land anywhere in the call: before `begin`,
    /// mid-body, or just before commit. Whatever the caller is told must match
    /// what the store holds afterwards.
    #[tokio::test]
    async fn test_reported_outcome_matches_store_under_short_deadlines() {
        let pool = test_pool().await;
        let service = ChatService::new(SqliteChatRepository::new(pool.clone()));
        service.create_chat(&names(&["Alan"]), &ctx()).await.unwrap();

        for i in 0..50u64 {
            let deadline = Duration::from_micros(i * 20);

            let text = format!("attempt {i}");
            let sent = service
                .send_message(
                    &NewMessage::new("Alan", text.clone(), Utc::now()),
                    &CallContext::new(deadline),
                )
                .await;
            let (stored,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE text = ?")
                .bind(&text)
                .fetch_one(&pool.writer)
                .await
                .unwrap();
            match sent {
                Ok(()) => assert_eq!(stored, 1, "sent {text} but it is missing"),
                Err(ChatError::DeadlineExceeded { .. }) => {
                    assert_eq!(stored, 0, "{text} reported as timed out but stored")
                }
                Err(other) => panic!("unexpected error for {text}: {other}"),
            }

            let username = format!("user{i}");
            let created = service
                .create_chat(&[username.clone()], &CallContext::new(deadline))
                .await;
            let user = service.repo().find_user(&username).await.unwrap();
            match created {
                Ok(chat_id) => {
                    let members = service.repo().chat_members(chat_id).await.unwrap();
                    assert_eq!(members.len(), 1);
                    assert_eq!(Some(members[0].clone()), user);
                }
                Err(ChatError::DeadlineExceeded { .. }) => {
                    assert!(user.is_none(), "{username} reported as timed out but stored")
                }
                Err(other) => panic!("unexpected error for {username}: {other}"),
            }
        }
    }
}

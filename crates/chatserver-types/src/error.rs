use thiserror::Error;

use crate::chat::{ChatId, UserId};

/// Errors from the chat operations engine and the service around it.
///
/// Every variant names the stage that failed. Infrastructure variants carry
/// the store's message as a string so the type stays free of any database
/// crate.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("begin transaction: {0}")]
    TransactionBegin(String),

    #[error("commit transaction: {0}")]
    Commit(String),

    #[error("build statement: {0}")]
    StatementBuild(#[from] StatementError),

    #[error("upsert user '{username}': {reason}")]
    UpsertFailed { username: String, reason: String },

    #[error("insert chat: {0}")]
    ChatInsertFailed(String),

    #[error("insert membership for user {user_id}: {reason}")]
    MembershipInsertFailed { user_id: UserId, reason: String },

    #[error("insert message: {0}")]
    MessageInsertFailed(String),

    #[error("{stage}: {reason}")]
    Lookup { stage: &'static str, reason: String },

    #[error("delete chat {chat_id}: {reason}")]
    DeleteFailed { chat_id: ChatId, reason: String },

    #[error("sender '{0}' not found")]
    SenderNotFound(String),

    #[error("sender '{0}' is not a member of any chat")]
    NoChatForSender(String),

    #[error("chat {0} not found")]
    ChatNotFound(ChatId),

    #[error("a chat needs at least one participant")]
    EmptyParticipants,

    #[error("invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("{operation}: deadline exceeded")]
    DeadlineExceeded { operation: &'static str },

    #[error("{operation}: cancelled")]
    Cancelled { operation: &'static str },
}

impl ChatError {
    /// True when the failure was caused by the caller's input rather than by
    /// the store or the runtime.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ChatError::SenderNotFound(_)
                | ChatError::NoChatForSender(_)
                | ChatError::ChatNotFound(_)
                | ChatError::EmptyParticipants
                | ChatError::InvalidUsername(_)
        )
    }

    /// True for the not-found family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChatError::SenderNotFound(_) | ChatError::NoChatForSender(_) | ChatError::ChatNotFound(_)
        )
    }
}

/// Malformed statement construction. Always a programming defect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatementError {
    #[error("table name is empty")]
    EmptyTable,

    #[error("no columns given for `{0}`")]
    NoColumns(String),

    #[error("`{table}` has {columns} columns but {values} values")]
    ColumnCountMismatch {
        table: String,
        columns: usize,
        values: usize,
    },

    #[error("refusing to delete from `{0}` without a filter")]
    UnfilteredDelete(String),
}

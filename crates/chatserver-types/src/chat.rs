//! User, chat, membership and message types.
//!
//! All identifiers are store-assigned surrogate keys. Chat ids only ever
//! grow, so a higher id means a more recently created chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

surrogate_id!(
    /// Identifier of a row in `users`.
    UserId
);

surrogate_id!(
    /// Identifier of a row in `chats`.
    ChatId
);

surrogate_id!(
    /// Identifier of a row in `messages`.
    MessageId
);

/// A chat participant. Usernames are unique and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// A chat. Existence is all that matters; `created_at` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub created_at: DateTime<Utc>,
}

/// Association of one user with one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Membership {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

/// A stored message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Input to `send_message`.
///
/// Carries no chat id: the target chat is the
/// highest-id chat the sender belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Username of the sender.
    pub from: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(from: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            from: from.into(),
            text: text.into(),
            timestamp,
        }
    }
}

/// A message joined with its sender's username, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

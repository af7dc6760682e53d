//! Parameterized statement construction.
//!
//! Pure functions from inputs to `Statement { sql, args }`. Nothing here
//! touches a connection; `Statement::query` is the only bridge to sqlx, and
//! it binds the arguments in the order their `?` placeholders appear.
//!
//! ```
//! use chatserver_infra::sqlite::statement::{select, SqlArg};
//!
//! let stmt = select(["chat_id"])
//!     .from("chat_users")
//!     .filter_eq("user_id", 7_i64)
//!     .order_by("chat_id DESC")
//!     .limit(1)
//!     .to_sql()
//!     .unwrap();
//! assert_eq!(stmt.sql, "SELECT chat_id FROM chat_users WHERE user_id = ? ORDER BY chat_id DESC LIMIT 1");
//! assert_eq!(stmt.args, vec![SqlArg::Int(7)]);
//! ```

use chatserver_types::chat::{ChatId, UserId};
use chatserver_types::error::StatementError;
use chrono::{DateTime, Utc};
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;

use super::chat::format_datetime;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Int(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<ChatId> for SqlArg {
    fn from(v: ChatId) -> Self {
        SqlArg::Int(v.0)
    }
}

impl From<UserId> for SqlArg {
    fn from(v: UserId) -> Self {
        SqlArg::Int(v.0)
    }
}

/// Statement text with `?` placeholders and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl Statement {
    /// A sqlx query with every argument bound.
    pub fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        self.args
            .iter()
            .fold(sqlx::query(&self.sql), |query, arg| match arg {
                SqlArg::Int(v) => query.bind(*v),
                SqlArg::Text(v) => query.bind(v.as_str()),
            })
    }
}

// ---------------------------------------------------------------------------
// Generic builders
// ---------------------------------------------------------------------------

/// `INSERT INTO table (columns) VALUES (values) [suffix]`.
#[derive(Debug, Clone, Default)]
pub struct Insert {
    table: String,
    columns: Vec<String>,
    values: Vec<SqlArg>,
    default_values: bool,
    suffix: Option<String>,
}

pub fn insert(table: &str) -> Insert {
    Insert {
        table: table.to_string(),
        ..Insert::default()
    }
}

impl Insert {
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn value(mut self, value: impl Into<SqlArg>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Insert a row made only of column defaults.
    pub fn default_values(mut self) -> Self {
        self.default_values = true;
        self
    }

    /// Raw trailing clause, e.g. `ON CONFLICT ...` or `RETURNING id`.
    pub fn suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_string());
        self
    }

    pub fn to_sql(self) -> Result<Statement, StatementError> {
        if self.table.trim().is_empty() {
            return Err(StatementError::EmptyTable);
        }

        let mut sql = format!("INSERT INTO {}", self.table);
        if self.default_values && self.columns.is_empty() && self.values.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            if self.columns.is_empty() {
                return Err(StatementError::NoColumns(self.table));
            }
            if self.columns.len() != self.values.len() {
                return Err(StatementError::ColumnCountMismatch {
                    table: self.table,
                    columns: self.columns.len(),
                    values: self.values.len(),
                });
            }
            let placeholders = vec!["?"; self.values.len()].join(", ");
            sql.push_str(&format!(
                " ({}) VALUES ({placeholders})",
                self.columns.join(", ")
            ));
        }

        if let Some(suffix) = &self.suffix {
            sql.push(' ');
            sql.push_str(suffix);
        }

        Ok(Statement {
            sql,
            args: self.values,
        })
    }
}

/// `SELECT columns FROM table [JOIN ..] [WHERE ..] [ORDER BY ..] [LIMIT n]`.
#[derive(Debug, Clone, Default)]
pub struct Select {
    columns: Vec<String>,
    table: String,
    joins: Vec<String>,
    filters: Vec<(String, SqlArg)>,
    order_by: Vec<String>,
    limit: Option<u64>,
}

pub fn select<I, S>(columns: I) -> Select
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Select {
        columns: columns.into_iter().map(Into::into).collect(),
        ..Select::default()
    }
}

impl Select {
    pub fn from(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Inner join; `clause` is everything after `JOIN`.
    pub fn join(mut self, clause: &str) -> Self {
        self.joins.push(clause.to_string());
        self
    }

    /// `column = ?`, ANDed with any other filters.
    pub fn filter_eq(mut self, column: &str, value: impl Into<SqlArg>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    /// Raw ordering term, e.g. `chat_id DESC`.
    pub fn order_by(mut self, term: &str) -> Self {
        self.order_by.push(term.to_string());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_sql(self) -> Result<Statement, StatementError> {
        if self.table.trim().is_empty() {
            return Err(StatementError::EmptyTable);
        }
        if self.columns.is_empty() {
            return Err(StatementError::NoColumns(self.table));
        }

        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.table);
        for join in &self.joins {
            sql.push_str(" JOIN ");
            sql.push_str(join);
        }
        let args = push_where(&mut sql, self.filters);
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok(Statement { sql, args })
    }
}

/// `DELETE FROM table WHERE ..`. A filter is mandatory.
#[derive(Debug, Clone, Default)]
pub struct Delete {
    table: String,
    filters: Vec<(String, SqlArg)>,
}

pub fn delete(table: &str) -> Delete {
    Delete {
        table: table.to_string(),
        ..Delete::default()
    }
}

impl Delete {
    pub fn filter_eq(mut self, column: &str, value: impl Into<SqlArg>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn to_sql(self) -> Result<Statement, StatementError> {
        if self.table.trim().is_empty() {
            return Err(StatementError::EmptyTable);
        }
        if self.filters.is_empty() {
            return Err(StatementError::UnfilteredDelete(self.table));
        }

        let mut sql = format!("DELETE FROM {}", self.table);
        let args = push_where(&mut sql, self.filters);
        Ok(Statement { sql, args })
    }
}

fn push_where(sql: &mut String, filters: Vec<(String, SqlArg)>) -> Vec<SqlArg> {
    if filters.is_empty() {
        return Vec::new();
    }
    let terms: Vec<String> = filters.iter().map(|(c, _)| format!("{c} = ?")).collect();
    sql.push_str(" WHERE ");
    sql.push_str(&terms.join(" AND "));
    filters.into_iter().map(|(_, v)| v).collect()
}

// ---------------------------------------------------------------------------
// Statements run by the chat engine
// ---------------------------------------------------------------------------

/// Insert-or-fetch: returns the user's id whether or not the row existed.
pub fn upsert_user(username: &str) -> Result<Statement, StatementError> {
    insert("users")
        .columns(["username"])
        .value(username)
        .suffix("ON CONFLICT (username) DO UPDATE SET username = excluded.username RETURNING id")
        .to_sql()
}

pub fn insert_chat() -> Result<Statement, StatementError> {
    insert("chats").default_values().suffix("RETURNING id").to_sql()
}

pub fn insert_membership(chat_id: ChatId, user_id: UserId) -> Result<Statement, StatementError> {
    insert("chat_users")
        .columns(["chat_id", "user_id"])
        .value(chat_id)
        .value(user_id)
        .suffix("ON CONFLICT (chat_id, user_id) DO NOTHING")
        .to_sql()
}

pub fn select_user_by_name(username: &str) -> Result<Statement, StatementError> {
    select(["id", "username"])
        .from("users")
        .filter_eq("username", username)
        .limit(1)
        .to_sql()
}

/// Routing rule: the sender's membership with the highest chat id.
pub fn select_latest_chat_for_user(user_id: UserId) -> Result<Statement, StatementError> {
    select(["chat_id"])
        .from("chat_users")
        .filter_eq("user_id", user_id)
        .order_by("chat_id DESC")
        .limit(1)
        .to_sql()
}

pub fn insert_message(
    chat_id: ChatId,
    sender_id: UserId,
    text: &str,
    timestamp: &DateTime<Utc>,
) -> Result<Statement, StatementError> {
    insert("messages")
        .columns(["chat_id", "sender_id", "text", "timestamp"])
        .value(chat_id)
        .value(sender_id)
        .value(text)
        .value(format_datetime(timestamp))
        .suffix("RETURNING id")
        .to_sql()
}

pub fn delete_chat(chat_id: ChatId) -> Result<Statement, StatementError> {
    delete("chats").filter_eq("id", chat_id).to_sql()
}

pub fn select_chat(chat_id: ChatId) -> Result<Statement, StatementError> {
    select(["id", "created_at"])
        .from("chats")
        .filter_eq("id", chat_id)
        .to_sql()
}

pub fn select_chat_members(chat_id: ChatId) -> Result<Statement, StatementError> {
    select(["u.id", "u.username"])
        .from("chat_users cu")
        .join("users u ON u.id = cu.user_id")
        .filter_eq("cu.chat_id", chat_id)
        .order_by("u.id ASC")
        .to_sql()
}

pub fn select_recent_messages(limit: u32) -> Result<Statement, StatementError> {
    select([
        "m.id",
        "m.chat_id",
        "u.username",
        "m.text",
        "m.timestamp",
    ])
    .from("messages m")
    .join("users u ON u.id = m.sender_id")
    .order_by("m.timestamp DESC")
    .order_by("m.id DESC")
    .limit(u64::from(limit))
    .to_sql()
}

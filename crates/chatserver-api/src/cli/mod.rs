//! CLI command definitions for the `chatserver` binary.
//!
//! Uses clap derive macros for argument parsing. Every subcommand except
//! `serve` runs a single chat operation against the configured database and
//! exits.

pub mod chat;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Transactional chat server: create chats, send messages, delete chats.
#[derive(Parser)]
#[command(name = "chatserver", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the TOML config file (default: <data dir>/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL, overriding the config file.
    #[arg(long, global = true, env = "CHATSERVER_DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server.
    Serve {
        /// Address to bind to.
        #[arg(long, env = "CHATSERVER_HOST")]
        host: Option<String>,

        /// Port to listen on.
        #[arg(long, short, env = "CHATSERVER_PORT")]
        port: Option<u16>,
    },

    /// Create a chat whose members are the given usernames.
    CreateChat {
        /// Participant usernames (case-sensitive).
        #[arg(required = true)]
        usernames: Vec<String>,
    },

    /// Send a message to the sender's most recent chat.
    Send {
        /// Username of the sender.
        #[arg(long)]
        from: String,

        /// Message text.
        text: String,
    },

    /// Delete a chat with its memberships and messages.
    #[command(alias = "rm")]
    DeleteChat {
        /// Chat id.
        id: i64,
    },

    /// Show the most recent messages across all chats.
    Messages {
        /// Number of messages to show (1-100).
        #[arg(long, short, default_value_t = 10)]
        limit: u32,
    },

    /// List the members of a chat.
    Members {
        /// Chat id.
        id: i64,
    },
}

//! Configuration loader for the chat server.
//!
//! Reads `config.toml` from the data directory (`~/.chatserver/` by default)
//! and deserializes it into [`ServerConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use chatserver_types::config::ServerConfig;

use crate::sqlite::pool::default_database_url;

/// Resolve the data directory.
///
/// `CHATSERVER_DATA_DIR` wins, then `~/.chatserver`, then `./.chatserver`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CHATSERVER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".chatserver");
    }

    PathBuf::from(".chatserver")
}

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`ServerConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config(path: &Path) -> ServerConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return ServerConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return ServerConfig::default();
        }
    };

    match toml::from_str::<ServerConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}

/// The configured database URL, or the default file inside `data_dir`.
pub fn database_url(config: &ServerConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| default_database_url(data_dir))
}

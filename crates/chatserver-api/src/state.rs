//! Application state wiring the chat service to its SQLite repository.
//!
//! AppState holds the concrete service instance used by both CLI and REST API.
//! The service is generic over the repository trait, but AppState pins it to
//! the infra implementation.

use std::path::Path;
use std::sync::Arc;

use chatserver_core::chat::context::CallContext;
use chatserver_core::chat::service::ChatService;
use chatserver_infra::config::database_url;
use chatserver_infra::sqlite::chat::SqliteChatRepository;
use chatserver_infra::sqlite::pool::DatabasePool;
use chatserver_types::config::ServerConfig;
use tokio_util::sync::CancellationToken;

pub type ConcreteChatService = ChatService<SqliteChatRepository>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub config: Arc<ServerConfig>,
    pub db_pool: DatabasePool,
    /// Parent of every per-call token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Connect to the database (running migrations) and wire the service.
    pub async fn init(config: ServerConfig, data_dir: &Path) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;

        let db_url = database_url(&config, data_dir);
        let db_pool = DatabasePool::new(&db_url).await?;

        Ok(Self::from_pool(db_pool, config))
    }

    pub fn from_pool(db_pool: DatabasePool, config: ServerConfig) -> Self {
        let chat_service = ChatService::new(SqliteChatRepository::new(db_pool.clone()));

        Self {
            chat_service: Arc::new(chat_service),
            config: Arc::new(config),
            db_pool,
            shutdown: CancellationToken::new(),
        }
    }

    /// A fresh context for one request: configured deadline, cancelled on
    /// shutdown.
    pub fn call_context(&self) -> CallContext {
        CallContext::child_of(&self.shutdown, self.config.request_timeout())
    }
}

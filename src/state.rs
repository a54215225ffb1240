use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager as RedisConnectionManager;
use sea_orm::{ConnectOptions, Database};
use sqlx::postgres::PgPool;

use crate::config::Config;
use crate::engine::{EngineConfig, ExecutionEngine};
use crate::queue::{InMemoryQueue, JobQueue, RedisQueue};
use crate::repositories::{
    CatalogRepository, CatalogStore, ExecutionRepository, ExecutionStore, MemoryStore,
    VariableRepository, VariableStore,
};
use crate::services::{HttpTransport, Orchestrator};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<ExecutionEngine>,
}

/// Store and queue handles an engine is assembled from
pub struct Backends {
    pub catalog: Arc<dyn CatalogStore>,
    pub variables: Arc<dyn VariableStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub queue: Arc<dyn JobQueue>,
}

impl Backends {
    /// Everything backed by one in-memory store and queue
    pub fn in_memory(store: &MemoryStore, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            catalog: Arc::new(store.clone()),
            variables: Arc::new(store.clone()),
            executions: Arc::new(store.clone()),
            queue,
        }
    }
}

impl AppState {
    /// Create a new AppState, connecting to Postgres and Redis when configured
    pub async fn new(config: Config) -> Result<Self, AppStateError> {
        let memory = MemoryStore::new();

        let (catalog, variables, executions): (
            Arc<dyn CatalogStore>,
            Arc<dyn VariableStore>,
            Arc<dyn ExecutionStore>,
        ) = match &config.database_url {
            Some(database_url) => {
                // Connect to PostgreSQL with SQLx (for migrations)
                let pg_pool = PgPool::connect(database_url)
                    .await
                    .map_err(|e| AppStateError::Postgres(e.to_string()))?;

                // Run migrations
                sqlx::migrate!("./migrations")
                    .run(&pg_pool)
                    .await
                    .map_err(|e| AppStateError::Migration(e.to_string()))?;

                // Connect to PostgreSQL with SeaORM
                let mut opt = ConnectOptions::new(database_url);
                opt.max_connections(100)
                    .min_connections(5)
                    .sqlx_logging(true);

                let db = Database::connect(opt)
                    .await
                    .map_err(|e| AppStateError::Postgres(e.to_string()))?;

                (
                    Arc::new(CatalogRepository::new(db.clone())),
                    Arc::new(VariableRepository::new(db.clone())),
                    Arc::new(ExecutionRepository::new(db)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                (
                    Arc::new(memory.clone()),
                    Arc::new(memory.clone()),
                    Arc::new(memory),
                )
            }
        };

        let queue: Arc<dyn JobQueue> = match &config.redis_url {
            Some(redis_url) => {
                // Connect to Redis
                let redis_client = redis::Client::open(redis_url.as_str())
                    .map_err(|e| AppStateError::Redis(e.to_string()))?;
                let redis = RedisConnectionManager::new(redis_client)
                    .await
                    .map_err(|e| AppStateError::Redis(e.to_string()))?;
                Arc::new(RedisQueue::new(redis))
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory queue");
                Arc::new(InMemoryQueue::new())
            }
        };

        Self::from_backends(
            config,
            Backends {
                catalog,
                variables,
                executions,
                queue,
            },
        )
    }

    /// Create AppState over in-memory stores (for testing)
    pub fn in_memory(config: Config, store: &MemoryStore) -> Result<Self, AppStateError> {
        Self::from_backends(config, Backends::in_memory(store, Arc::new(InMemoryQueue::new())))
    }

    pub fn from_backends(config: Config, backends: Backends) -> Result<Self, AppStateError> {
        let transport = HttpTransport::new(
            Duration::from_secs(config.test_timeout_seconds),
            config.accept_invalid_certs,
        )
        .map_err(|e| AppStateError::Transport(e.to_string()))?;

        let orchestrator = Orchestrator::new(
            backends.catalog,
            backends.variables.clone(),
            backends.executions.clone(),
            transport,
            config.max_concurrent_tests,
        );

        let engine = ExecutionEngine::new(
            orchestrator,
            backends.executions,
            backends.variables,
            backends.queue,
            EngineConfig::from_config(&config),
        );

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppStateError {
    #[error("PostgreSQL connection error: {0}")]
    Postgres(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Redis connection error: {0}")]
    Redis(String),

    #[error("HTTP client error: {0}")]
    Transport(String),
}

use std::time::Duration;

use axum_test::TestServer;
use uuid::Uuid;

use apirun::build_router;
use apirun::config::Config;
use apirun::engine::ExecutionView;
use apirun::repositories::MemoryStore;
use apirun::state::AppState;

use super::stub::StubServer;

/// Test configuration
pub fn test_config() -> Config {
    let mut config = Config::with_defaults("test-jwt-secret-that-is-at-least-32-characters-long");
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.test_timeout_seconds = 5;
    config.worker_concurrency = 2;
    config
}

/// Test application wrapper
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    /// Backing store for catalog, variables and executions
    pub store: MemoryStore,
    /// Remote system under test
    pub stub: StubServer,
}

impl TestApp {
    /// Create a new test application with running workers
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let app = Self::without_workers(config).await;
        app.state.engine.start().await;
        app
    }

    /// Executions stay pending until something runs them
    pub async fn without_workers(config: Config) -> Self {
        let store = MemoryStore::new();
        let state =
            AppState::in_memory(config, &store).expect("Failed to create test app state");

        let router = build_router(state.clone());
        let server = TestServer::new(router).expect("Failed to create test server");
        let stub = StubServer::start().await;

        Self {
            server,
            state,
            store,
            stub,
        }
    }

    /// Block until an execution reaches a terminal state
    pub async fn wait_for(&self, execution_id: Uuid) -> ExecutionView {
        self.state
            .engine
            .wait_for(execution_id, Duration::from_secs(15))
            .await
            .expect("Execution did not finish")
    }
}

// Library crate for apirun
// Exports modules for use by the worker binary and tests

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod middlewares;
pub mod models;
pub mod queue;
pub mod repositories;
pub mod services;
pub mod state;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    cancel_execution, dry_run_test_case, get_execution, get_execution_results, get_queue_stats,
    list_executions, submit_batch, submit_single, submit_suite, validate_test_case,
};
use crate::middlewares::auth_middleware;
use crate::state::AppState;

/// Build the application router with the given state
pub fn build_router(state: AppState) -> Router {
    // Protected routes (require authentication)
    let protected_routes = Router::new()
        // Submission routes
        .route("/api/executions/single", post(submit_single))
        .route("/api/executions/batch", post(submit_batch))
        .route("/api/executions/suite", post(submit_suite))
        // Execution routes
        .route("/api/executions", get(list_executions))
        .route("/api/executions/stats", get(get_queue_stats))
        .route(
            "/api/executions/{id}",
            get(get_execution).delete(cancel_execution),
        )
        .route("/api/executions/{id}/results", get(get_execution_results))
        // Test case tooling
        .route("/api/test-cases/{id}/validate", post(validate_test_case))
        .route("/api/test-cases/{id}/dry-run", post(dry_run_test_case))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(|| async { "Hello, apirun!" }))
        // Protected routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use apirun::config::{Config, LogFormat};
use apirun::handlers::{
    CancelResponse, DryRunRequest, DryRunResponse, EnvironmentStatusResponse,
    ExecutionListResponse, ExecutionResponse, ExecutionResultsResponse, ProgressResponse,
    QueueStatsResponse, ResultResponse, ResultSummaryResponse, SubmitBatchRequest,
    SubmitResponse, SubmitSingleRequest, SubmitSuiteRequest, SummaryResponse, ValidateRequest,
    ValidateResponse, VariablePreviewResponse, VariableValidationResponse,
};
use apirun::state::AppState;
use apirun::{build_router, handlers};

/// Security scheme for Bearer token
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::execution::submit_single,
        handlers::execution::submit_batch,
        handlers::execution::submit_suite,
        handlers::execution::get_execution,
        handlers::execution::get_execution_results,
        handlers::execution::cancel_execution,
        handlers::execution::list_executions,
        handlers::execution::get_queue_stats,
        handlers::test_case::validate_test_case,
        handlers::test_case::dry_run_test_case,
    ),
    components(schemas(
        SubmitSingleRequest,
        SubmitBatchRequest,
        SubmitSuiteRequest,
        SubmitResponse,
        ProgressResponse,
        SummaryResponse,
        ExecutionResponse,
        ExecutionListResponse,
        ResultResponse,
        ResultSummaryResponse,
        ExecutionResultsResponse,
        CancelResponse,
        QueueStatsResponse,
        ValidateRequest,
        ValidateResponse,
        EnvironmentStatusResponse,
        VariableValidationResponse,
        VariablePreviewResponse,
        DryRunRequest,
        DryRunResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Executions", description = "Submit, poll and cancel test executions"),
        (name = "Test Cases", description = "Variable validation and request preview")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");
    init_tracing(config.log_format);

    let addr = config.server_addr();
    let embedded_worker = config.embedded_worker;

    // Initialize application state (connects to configured backends)
    tracing::info!("Connecting to backends...");
    let state = AppState::new(config)
        .await
        .expect("Failed to initialize application state");
    tracing::info!("Backends ready");

    let engine = state.engine.clone();
    if embedded_worker {
        engine.start().await;
    }

    // Build the main application router
    let app = build_router(state)
        // Add Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind server address");

    tracing::info!("Server started on http://{}", addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui/", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    engine.shutdown().await;
}

fn init_tracing(format: LogFormat) {
    let builder =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env());

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

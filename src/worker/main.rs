use tokio::signal;
use tokio::sync::watch;

// Import from the main crate
use apirun::config::{Config, LogFormat};
use apirun::state::AppState;

#[tokio::main]
async fn main() {
    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    // Initialize tracing
    let builder =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }

    tracing::info!("Starting apirun worker...");

    // In-memory stores would leave this process with a private, always-empty queue
    if let Err(e) = config.require_shared_backends() {
        tracing::error!(error = %e, "Standalone worker needs DATABASE_URL and REDIS_URL");
        std::process::exit(1);
    }

    // Initialize application state
    tracing::info!("Connecting to backends...");
    let workers = config.worker_concurrency.max(1);
    let state = AppState::new(config)
        .await
        .expect("Failed to initialize application state");
    tracing::info!("Backends ready");

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, stopping worker...");
        let _ = shutdown_tx.send(true);
    });

    // Expire stale temporary variables once at startup; the server's engine sweeps periodically
    if let Err(e) = state.engine.sweep_expired_variables().await {
        tracing::warn!(error = %e, "Failed to expire temporary variables");
    }

    // Worker loops
    tracing::info!(workers, "Worker started, waiting for executions...");
    let loops: Vec<_> = (0..workers)
        .map(|worker| {
            let engine = state.engine.clone();
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move { engine.run_worker_loop(worker, shutdown_rx).await })
        })
        .collect();

    for result in futures::future::join_all(loops).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Worker loop ended abnormally");
        }
    }

    tracing::info!("Worker shutdown complete");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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
}

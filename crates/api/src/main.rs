use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stemsvc_api::background;
use stemsvc_api::config::{ServerConfig, StorageBackend};
use stemsvc_api::engine::JobOrchestrator;
use stemsvc_api::router::build_app_router;
use stemsvc_api::state::AppState;
use stemsvc_db::JobRegistry;
use stemsvc_events::EventBus;
use stemsvc_separation::{BandSplitModel, SeparationWorker};
use stemsvc_storage::{MemoryObjectStore, ObjectStore, S3ObjectStore, StorageGateway};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stemsvc_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Object storage ---
    let store: Arc<dyn ObjectStore> = match &config.storage.backend {
        StorageBackend::S3(s3) => {
            tracing::info!(bucket = %s3.bucket, region = %s3.region, "Using S3 object storage");
            Arc::new(S3ObjectStore::connect(s3).await)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object storage; contents are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };
    let storage = StorageGateway::new(store, config.storage.retry.clone());

    // --- Event bus and job registry ---
    let events = Arc::new(EventBus::default());
    let registry = Arc::new(JobRegistry::with_events(Arc::clone(&events)));

    // --- Job engine ---
    let worker = SeparationWorker::new(Arc::new(BandSplitModel::new()));
    let orchestrator = JobOrchestrator::start(
        Arc::clone(&registry),
        storage,
        worker,
        config.engine.clone(),
    );

    // --- Retention sweep ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(background::job_retention::run(
        Arc::clone(&registry),
        config.retention.clone(),
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        events,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    orchestrator.shutdown().await;

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Job retention task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

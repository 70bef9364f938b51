use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use order_sync_daemon::{invalidator::LoggingInvalidator, DaemonConfig};
use sync_client::{ReqwestConnectivityMonitor, SyncOrchestrator, SyncTransport};
use sync_store::{Database, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("starting order-sync-daemon");

    let config = DaemonConfig::load()?;
    info!(
        database_path = %config.database_path.display(),
        server = %config.sync.server.base_url,
        "configuration loaded"
    );

    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("local store ready");

    let transport = SyncTransport::new(&config.sync)?;
    let connectivity = ReqwestConnectivityMonitor::spawn(transport.clone(), Duration::from_secs(10));

    let orchestrator = SyncOrchestrator::init(
        db,
        transport,
        Arc::new(LoggingInvalidator),
        config.sync.sync.pull_page_size,
        Duration::from_millis(config.sync.sync.push_interval_ms),
        Duration::from_millis(config.sync.sync.sse_debounce_ms),
        connectivity,
    );

    let handle = orchestrator.start().await;
    info!("sync orchestrator started");

    let mut status_rx = handle.subscribe();
    let status_logger = tokio::spawn(async move {
        loop {
            if status_rx.changed().await.is_err() {
                break;
            }
            let status = status_rx.borrow().clone();
            info!(
                connectivity = ?status.connectivity,
                is_syncing = status.is_syncing,
                pending = status.pending_count,
                last_error = ?status.last_error,
                "sync status changed"
            );
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received");
    handle.shutdown().await;
    status_logger.abort();

    info!("order-sync-daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
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

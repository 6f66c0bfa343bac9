//! Ark Backup Deletion Controller
//!
//! Main entry point for the controller. Loads configuration, sets up the
//! Kubernetes client and storage adapters, and runs the deletion controller.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ark_backup_deletion_controller::{
    adapters::{KubeClusterClient, LocalBackupService},
    clock::SystemClock,
    config::Config,
    controllers::{self, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Ark Backup Deletion Controller");

    let config = Config::from_env()?;
    info!(
        bucket = %config.backup_bucket,
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        workers = config.workers,
        "Loaded configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    warn!("No PersistentVolumeProvider configured; backups with volume snapshots cannot be deleted");

    let metrics_port = config.metrics_port;
    let context = Arc::new(Context::new(
        Arc::new(KubeClusterClient::new(client.clone())),
        Arc::new(LocalBackupService::new(config.storage_root.clone())),
        None,
        Arc::new(SystemClock),
        config,
    ));

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let shutdown = CancellationToken::new();
    let mut controller = tokio::spawn(controllers::run_backup_deletion_controller(
        client,
        context,
        shutdown.clone(),
    ));

    // Handle graceful shutdown
    tokio::select! {
        result = &mut controller => {
            match result {
                Ok(Ok(())) => error!("BackupDeletion controller exited unexpectedly"),
                Ok(Err(e)) => error!(error = %e, "BackupDeletion controller failed"),
                Err(e) => error!(error = %e, "BackupDeletion controller panicked"),
            }
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping controller");
            shutdown.cancel();
            match controller.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "BackupDeletion controller failed during shutdown"),
                Err(e) => error!(error = %e, "BackupDeletion controller panicked during shutdown"),
            }
        }
    }

    info!("Ark Backup Deletion Controller stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
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
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

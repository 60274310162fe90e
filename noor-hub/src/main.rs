//! NOOR Canvas Hub - Main entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use noor_hub::config::{Args, Config};
use noor_hub::Hub;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting NOOR Canvas hub v{}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());
    info!(
        "Vote policy: {:?} ({}), retry limit {}",
        config.hub.vote_policy,
        config.hub.vote_policy.describe(),
        config.hub.vote_retry_limit
    );

    let pool = noor_common::db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let hub = Arc::new(Hub::with_sqlite(pool.clone(), config.hub.clone()));

    noor_hub::api::run(config.socket_addr(), hub, shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

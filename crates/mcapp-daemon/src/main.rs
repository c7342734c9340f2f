//! mcappd - Multi-cluster application controller daemon
//!
//! Runs the MultiClusterApp control loop against in-memory stores,
//! optionally seeded from a JSON manifest, until Ctrl+C or SIGTERM.

use anyhow::Context;
use clap::Parser;
use mcapp_controller::{Controller, InMemoryStores};
use mcapp_daemon::{DaemonConfig, Manifest};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// mcappd CLI
#[derive(Parser)]
#[command(name = "mcappd")]
#[command(about = "Multi-cluster application controller daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MCAPP_CONFIG")]
    config: Option<String>,

    /// Log level; overrides the configured one
    #[arg(long, env = "MCAPP_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MCAPP_LOG_JSON")]
    json: bool,

    /// JSON manifest of template versions and MCApps to load at startup
    #[arg(short, long, env = "MCAPP_MANIFEST")]
    manifest: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DaemonConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.controller.global_namespace,
        "Starting mcappd"
    );

    let stores = InMemoryStores::new();
    if let Some(path) = &cli.manifest {
        let seeded = Manifest::load(path)
            .await?
            .seed(&stores, &config.controller.global_namespace)
            .await?;
        tracing::info!(manifest = %path, objects = seeded, "Manifest loaded");
    }

    let controller = Arc::new(Controller::new(config.controller, stores.stores()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(controller.run(shutdown_rx));

    shutdown_signal().await;
    // Receiver lives in the controller task; a send error means it already exited
    let _ = shutdown_tx.send(true);
    running.await.context("Controller task failed")?;

    tracing::info!("mcappd stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

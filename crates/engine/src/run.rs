//! Engine lifecycle.
//!
//! Loads configuration, initializes logging, builds the service through the
//! composition root, runs the background tick loop and performs the shutdown
//! save once the process is asked to stop.

use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::composition;
use crate::config::AppConfig;
use crate::tick;

/// Spawns a task that cancels the token on SIGTERM/SIGINT.
fn setup_shutdown_signal(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
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
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        cancel_token.cancel();
    });
}

pub async fn run() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wayfarer_engine=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Wayfarer Engine");

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();
    setup_shutdown_signal(cancel_token.clone());

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!("Configuration loaded");
    tracing::info!("  Database: {}", config.database_path);
    tracing::info!("  Content: {}", config.content_dir);
    tracing::info!(
        "  Tick: every {}s, time scale {}x, save every {} world-seconds",
        config.tick.interval_seconds,
        config.tick.time_scale,
        config.tick.save_interval
    );

    // Assemble the world service
    let service = composition::build(&config).await?;
    tracing::info!("World service initialized");

    // Start the background tick loop
    let tick_worker = {
        let state = service.state();
        let ports = service.ports().clone();
        let registry = service.registry();
        let persistence = service.persistence().clone();
        let tick_config = config.tick.clone();
        let cancel = cancel_token.clone();
        tokio::spawn(async move {
            tick::run_tick_loop(state, ports, registry, persistence, tick_config, cancel).await;
        })
    };

    // Run until shutdown is requested
    cancel_token.cancelled().await;

    tracing::info!("Waiting for workers to complete...");
    let _ = tokio::time::timeout(Duration::from_secs(10), tick_worker).await;

    // Final flush: the tick loop has stopped, nothing else mutates state
    let failed = service.save_all().await;
    if failed > 0 {
        tracing::error!("{failed} tenant(s) failed to save during shutdown");
    }

    tracing::info!("Wayfarer Engine shutdown complete");
    Ok(())
}

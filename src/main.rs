//! fleetd - vehicle fleet telemetry service entry point
//!
//! Wires together the library pieces: configuration resolution, the
//! database pool, the TCP ingestion listener, and the HTTP read API,
//! with coordinated shutdown across all of them.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetd::config::{Args, Config};
use fleetd::db::TelemetryStore;
use fleetd::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetd=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Build identification first, before any slow startup work
    info!(
        "Starting fleetd v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = Config::resolve(&args).context("Failed to resolve configuration")?;

    let pool = fleetd::db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;
    let store = TelemetryStore::new(pool.clone());

    let shutdown = CancellationToken::new();

    // Telemetry ingestion listener (TCP)
    let ingest_listener = tokio::net::TcpListener::bind(config.ingest_addr)
        .await
        .with_context(|| format!("Failed to bind telemetry listener on {}", config.ingest_addr))?;
    let ingest_task = tokio::spawn(fleetd::ingest::run(
        ingest_listener,
        store.clone(),
        shutdown.clone(),
    ));

    // HTTP read API
    let state = AppState::new(store);
    let app = build_router(state);

    let api_listener = tokio::net::TcpListener::bind(config.api_addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", config.api_addr))?;
    info!("API server on http://{}", config.api_addr);

    axum::serve(api_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // HTTP has drained; stop the ingestion side, then release storage
    shutdown.cancel();
    match ingest_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("telemetry listener error: {e}"),
        Err(e) => error!("telemetry listener task failed: {e}"),
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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

//! Loghound Binary Entry Point
//!
//! Runs the log ingestion daemon: HTTP ingestion/query endpoints on top of
//! the SQLite store, plus the scheduled retention sweep.
//! Core functionality is provided by the `loghound` library crate.

use clap::Parser;
use loghound::{
    StorageBuilder,
    config::AppConfig,
    housekeeping::RetentionJob,
    server::{AppState, ServiceInfo, create_router},
    storage::normalize_retention_days,
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Loghound - structured log ingestion daemon
#[derive(Parser, Debug)]
#[command(name = "loghound", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, env = "LOGHOUND_CONFIG")]
    config: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "LOGHOUND_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "LOGHOUND_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database URL or path (overrides config file)
    #[arg(long, env = "LOGHOUND_DB_URL")]
    db_url: Option<String>,

    /// Days of logs to keep, clamped to 1..=365 (overrides config file)
    #[arg(long, env = "LOGHOUND_RETENTION_DAYS")]
    retention_days: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loghound=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Loghound - structured log ingestion daemon");

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            AppConfig::default()
        }
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }
    if let Some(days) = cli.retention_days.as_deref() {
        config.retention.days = normalize_retention_days(Some(days));
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}, Retention: {} days",
        config.server.bind,
        config.server.port,
        config.database.url,
        config.retention.days,
    );

    // Build storage layer
    let handles = StorageBuilder::new(&config.database.url)
        .channel_capacity(config.database.channel_capacity)
        .build()
        .await?;

    tracing::info!("Storage initialized");

    let mut retention = RetentionJob::new(
        handles.admin.clone(),
        config.retention.days,
        config.retention.sweep_interval,
    )
    .await?;
    retention.start().await?;

    let app_state = AppState::new(
        &handles,
        ServiceInfo::new(
            config.server.bind.clone(),
            config.server.port,
            config.retention.days,
        ),
    );
    let app = create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    tracing::info!("Ingestion endpoint: http://{}/logs/ingest", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests have drained; the writer can stop now.
    tracing::info!("Stopping retention sweep...");
    if let Err(e) = retention.shutdown().await {
        tracing::error!("Failed to stop retention scheduler: {}", e);
    }

    tracing::info!("Shutting down storage...");
    if let Err(e) = handles.shutdown().await {
        tracing::error!("Failed to shutdown storage: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
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
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

//! Pingwatch Binary Entry Point
//!
//! This binary runs the complete Pingwatch monitoring system.
//! Core functionality is provided by the `pingwatch` library crate.

use clap::Parser;
use pingwatch::{
    config::AppConfig,
    probe::{Dialect, ProbeRunner},
    scheduler::Scheduler,
    server::{create_router, AppState},
    storage::{LogLevel, Storage},
};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pingwatch - Host Reachability and Latency Monitor
#[derive(Parser, Debug)]
#[command(name = "pingwatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/config.yaml",
        env = "PINGWATCH_CONFIG"
    )]
    config: String,

    /// Server bind address (overrides config file)
    #[arg(long, env = "PINGWATCH_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "PINGWATCH_SERVER_PORT")]
    server_port: Option<u16>,

    /// Database file path (overrides config file)
    #[arg(long, env = "PINGWATCH_DB_PATH")]
    db_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pingwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Pingwatch - Host Reachability and Latency Monitor");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    config.validate()?;

    tracing::info!(
        "Server: {}:{}, Database: {}",
        config.server.bind,
        config.server.port,
        config.database.path,
    );

    // Open storage; a database that cannot be opened is fatal.
    let db_url = config.database.url();
    tracing::info!("Initializing storage at: {}", db_url);
    let storage = Storage::open(&db_url).await?;

    storage
        .logs
        .record(
            LogLevel::Info,
            "MAIN",
            format!("service started, monitoring {} targets", config.targets.len()),
            None,
        )
        .await;

    // Probe dialect: configured override, otherwise the host's own.
    let dialect = config.probe.dialect.unwrap_or_else(Dialect::native);
    tracing::info!(
        dialect = %dialect,
        count = config.probe.count,
        timeout = ?config.probe.timeout,
        "probe configuration"
    );

    let runner = ProbeRunner::new(
        dialect,
        config.probe.count,
        config.probe.timeout,
        storage.logs.clone(),
    );

    let scheduler = Scheduler::new(
        config.targets.clone(),
        runner,
        config.thresholds,
        config.alerts,
        config.probe.interval,
        config.probe.concurrency,
        storage.measurements.clone(),
        storage.logs.clone(),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Create web server state
    let app_state = AppState {
        measurements: storage.measurements.clone(),
        logs: storage.logs.clone(),
    };
    let app = create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the sweep loop and flush storage.
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        tracing::error!("Scheduler task failed: {}", e);
    }

    storage
        .logs
        .record(LogLevel::Info, "MAIN", "service stopping".to_string(), None)
        .await;
    storage.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
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

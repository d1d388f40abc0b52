//! Cueboard Daemon - shared button board for a live production switcher.
//!
//! Serves button configurations to any number of clients over TCP and
//! drives the switcher on their behalf through a single control connection.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use cueboard_daemon::daemon::{self, Daemon};
use cueboard_daemon::{load_config, signals};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = load_config()?;

    // Initialize logging
    let level: LevelFilter = config
        .daemon
        .log_level
        .parse()
        .with_context(|| format!("Invalid daemon.log_level: {}", config.daemon.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy()
                .add_directive("tungstenite=warn".parse()?)
                .add_directive("tokio_tungstenite=warn".parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Cueboard daemon");
    info!(
        backend = ?config.switcher.backend,
        url = %config.switcher.url,
        listen = %config.server.listen,
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();
    signals::setup_signal_handlers(&shutdown);

    let backend = daemon::backend(&config.switcher);
    let service = Daemon::start(&config, backend, shutdown.clone()).await?;

    shutdown.cancelled().await;
    info!("Shutting down");
    service.shutdown().await;

    Ok(())
}

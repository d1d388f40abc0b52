//! Service composition and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use cueboard_core::{ConfigurationResolver, ConfigurationStore, SessionRegistry};
use cueboard_ipc::IpcServer;
use cueboard_switcher::{ObsBackend, SimulatedSwitcher, SwitcherBackend, SwitcherConnection};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::broadcaster::{BroadcasterConfig, StatusBroadcaster};
use crate::config::{BackendKind, Config, SwitcherConfig};
use crate::router::RequestRouter;
use crate::sweeper::SessionSweeper;

/// Build the switcher backend named in the config.
#[must_use]
pub fn backend(config: &SwitcherConfig) -> Arc<dyn SwitcherBackend> {
    match config.backend {
        BackendKind::Obs => Arc::new(ObsBackend::new(config.url.clone(), config.password.clone())),
        BackendKind::Simulated => Arc::new(SimulatedSwitcher::new()),
    }
}

/// A running daemon: the switcher link, the status loop, the session
/// sweeper and the TCP server, all stopped by one token.
pub struct Daemon {
    local_addr: SocketAddr,
    store: Arc<ConfigurationStore>,
    registry: Arc<SessionRegistry>,
    connection: Arc<SwitcherConnection>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl Daemon {
    /// Seed the store, bind the server and start every background loop.
    ///
    /// # Errors
    /// Fails if the default configuration cannot be seeded or the listen
    /// address cannot be bound.
    pub async fn start(config: &Config, backend: Arc<dyn SwitcherBackend>, cancel: CancellationToken) -> Result<Self> {
        let store = Arc::new(ConfigurationStore::new());
        store.seed_default(config.layout.grid()).context("Failed to seed default configuration")?;
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));

        let connection = Arc::new(SwitcherConnection::new(backend, config.switcher.connection()));
        let broadcaster = Arc::new(StatusBroadcaster::new(
            Arc::clone(&connection),
            ConfigurationResolver::new(Arc::clone(&store)),
            BroadcasterConfig {
                poll_interval: config.status.poll_interval(),
                query_timeout: config.status.query_timeout(),
            },
        ));
        let sweeper = SessionSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            config.sessions.idle_ttl(),
            config.sessions.sweep_interval(),
        );

        let (server, messages) = IpcServer::bind(config.server.listen.as_str())
            .await
            .with_context(|| format!("Failed to bind {}", config.server.listen))?;
        let local_addr = server.local_addr().context("Failed to read listen address")?;
        let router = Arc::new(RequestRouter::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&connection),
            Arc::clone(&broadcaster),
            server.event_sender(),
            local_addr,
        ));

        let mut tasks = JoinSet::new();
        tasks.spawn(Arc::clone(&connection).run(cancel.clone()));
        tasks.spawn(Arc::clone(&broadcaster).run(cancel.clone()));
        tasks.spawn(sweeper.run(cancel.clone()));
        tasks.spawn(router.serve(messages, cancel.clone()));
        tasks.spawn({
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = server.run() => {}
                }
                info!("IPC server stopped");
            }
        });

        info!(addr = %local_addr, "Daemon started");
        Ok(Self { local_addr, store, registry, connection, cancel, tasks })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ConfigurationStore> {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<SwitcherConnection> {
        &self.connection
    }

    /// Cancel every loop and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Daemon task failed");
            }
        }
        info!("Daemon stopped");
    }
}

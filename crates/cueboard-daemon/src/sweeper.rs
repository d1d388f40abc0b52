//! Periodic reclamation of idle sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cueboard_core::{ClientSession, SessionRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcaster::StatusBroadcaster;

pub struct SessionSweeper {
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<StatusBroadcaster>,
    idle_ttl: chrono::Duration,
    interval: Duration,
}

impl SessionSweeper {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<StatusBroadcaster>,
        idle_ttl: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self { registry, broadcaster, idle_ttl, interval }
    }

    /// Reclaim sessions idle at `now`, dropping their subscriptions too.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Vec<ClientSession> {
        let reclaimed = self.registry.sweep_idle_at(now, self.idle_ttl);
        for session in &reclaimed {
            self.broadcaster.remove_session(&session.session_id);
        }
        reclaimed
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(ttl = %self.idle_ttl, interval = ?self.interval, "Session sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let reclaimed = self.sweep_at(Utc::now());
                    if !reclaimed.is_empty() {
                        debug!(count = reclaimed.len(), remaining = self.registry.len(), "Idle sessions swept");
                    }
                }
            }
        }
        info!("Session sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use cueboard_core::{ConfigurationResolver, ConfigurationStore, GridConfig};
    use cueboard_switcher::{ConnectionConfig, SimulatedSwitcher, SwitcherConnection};
    use tokio::sync::mpsc;

    use super::*;
    use crate::broadcaster::BroadcasterConfig;

    fn sweeper() -> (Arc<SessionRegistry>, Arc<StatusBroadcaster>, SessionSweeper) {
        let store = Arc::new(ConfigurationStore::new());
        store.seed_default(GridConfig::new(2, 2)).unwrap();
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        let connection =
            Arc::new(SwitcherConnection::new(Arc::new(SimulatedSwitcher::new()), ConnectionConfig::default()));
        let broadcaster = Arc::new(StatusBroadcaster::new(
            connection,
            ConfigurationResolver::new(store),
            BroadcasterConfig { poll_interval: Duration::from_millis(500), query_timeout: Duration::from_secs(2) },
        ));
        let sweeper = SessionSweeper::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            chrono::Duration::minutes(10),
            Duration::from_secs(60),
        );
        (registry, broadcaster, sweeper)
    }

    #[test]
    fn test_sweep_reclaims_idle_sessions_and_subscriptions() {
        let (registry, broadcaster, sweeper) = sweeper();
        let idle = registry.register("idle", "", "").unwrap();
        let busy = registry.register("busy", "", "").unwrap();
        let (tx, _rx) = mpsc::channel(4);
        broadcaster.subscribe(&idle.session_id, 1, tx.clone());
        broadcaster.subscribe(&busy.session_id, 2, tx);

        let later = Utc::now() + chrono::Duration::minutes(30);
        registry.touch_at(&busy.session_id, later).unwrap();

        let reclaimed = sweeper.sweep_at(later);
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].session_id, idle.session_id);
        assert!(registry.lookup(&idle.session_id).is_err());
        assert!(registry.lookup(&busy.session_id).is_ok());
        assert_eq!(broadcaster.subscribed_sessions(), 1);

        assert!(sweeper.sweep_at(later).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let (_, _, sweeper) = sweeper();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}

//! Switcher status polling and fan-out.
//!
//! One background loop polls the switcher, diffs the result against the
//! last snapshot and, only when something changed, stores the new snapshot
//! and pushes it to every subscribed session. `get_status` reads the same
//! stored snapshot, so pushed and pulled status never disagree.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use cueboard_core::{ConfigurationResolver, LinkState, StatusUpdate, SwitcherStatus};
use cueboard_ipc::Event;
use cueboard_switcher::{SwitcherConnection, SwitcherError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outbound event channel of one client connection.
#[derive(Debug, Clone)]
struct Subscriber {
    client_id: u64,
    outbox: mpsc::Sender<Event>,
}

/// Polling knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcasterConfig {
    pub poll_interval: Duration,
    /// Deadline for one status query
    pub query_timeout: Duration,
}

pub struct StatusBroadcaster {
    connection: Arc<SwitcherConnection>,
    resolver: ConfigurationResolver,
    config: BroadcasterConfig,
    current: ArcSwap<StatusUpdate>,
    /// Session id to the connections subscribed on its behalf
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl StatusBroadcaster {
    #[must_use]
    pub fn new(
        connection: Arc<SwitcherConnection>,
        resolver: ConfigurationResolver,
        config: BroadcasterConfig,
    ) -> Self {
        let initial = StatusUpdate { sequence: 0, changed: Vec::new(), status: SwitcherStatus::disconnected() };
        Self {
            connection,
            resolver,
            config,
            current: ArcSwap::from_pointee(initial),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Latest published update.
    #[must_use]
    pub fn current(&self) -> Arc<StatusUpdate> {
        self.current.load_full()
    }

    /// Latest published status snapshot.
    #[must_use]
    pub fn status(&self) -> SwitcherStatus {
        self.current.load().status.clone()
    }

    /// Visibility of a source: the tracked value when there is one, a live
    /// query otherwise. Anything the switcher cannot answer reads as hidden.
    pub async fn source_visibility(&self, scene: &str, source: &str) -> bool {
        if let Some(visible) = self.current.load().status.source_visibility(scene, source) {
            return visible;
        }
        match self.connection.source_visible(scene, source, self.config.query_timeout).await {
            Ok(visible) => visible,
            Err(e) => {
                debug!(scene, source, error = %e, "Live visibility query failed");
                false
            }
        }
    }

    /// Route status updates for `session_id` to `outbox`.
    ///
    /// The current snapshot is pushed right away. Subscribing the same
    /// connection twice for a session replaces the earlier subscription.
    pub fn subscribe(&self, session_id: &str, client_id: u64, outbox: mpsc::Sender<Event>) {
        let mut subscribers = self.subscribers.lock();
        let snapshot = Event::status_update(&self.current.load());
        deliver(session_id, &outbox, snapshot);

        let entry = subscribers.entry(session_id.to_string()).or_default();
        entry.retain(|s| s.client_id != client_id);
        entry.push(Subscriber { client_id, outbox });
        debug!(session_id, client_id, "Status subscription added");
    }

    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&self, session_id: &str, client_id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let Some(entry) = subscribers.get_mut(session_id) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|s| s.client_id != client_id);
        let removed = entry.len() != before;
        if entry.is_empty() {
            subscribers.remove(session_id);
        }
        removed
    }

    /// Drop every subscription a closed connection made.
    pub fn remove_client(&self, client_id: u64) {
        self.subscribers.lock().retain(|_, entry| {
            entry.retain(|s| s.client_id != client_id);
            !entry.is_empty()
        });
    }

    /// Drop every subscription of a reclaimed session. Safe to repeat.
    pub fn remove_session(&self, session_id: &str) {
        if self.subscribers.lock().remove(session_id).is_some() {
            debug!(session_id, "Status subscriptions of session removed");
        }
    }

    /// Number of sessions with at least one subscription.
    #[must_use]
    pub fn subscribed_sessions(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Push `event` to every connection subscribed for `session_id`.
    pub fn send_to_session(&self, session_id: &str, event: &Event) {
        let mut subscribers = self.subscribers.lock();
        if let Some(entry) = subscribers.get_mut(session_id) {
            entry.retain(|s| deliver(session_id, &s.outbox, event.clone()));
        }
    }

    /// Store `status` and push it if it differs from the current snapshot.
    ///
    /// Returns whether an update was published.
    pub fn publish(&self, status: SwitcherStatus) -> bool {
        let mut subscribers = self.subscribers.lock();
        let previous = self.current.load();
        let changed = status.changed_fields(&previous.status);
        if changed.is_empty() {
            return false;
        }

        let update = StatusUpdate { sequence: previous.sequence + 1, changed, status };
        debug!(sequence = update.sequence, changed = ?update.changed, "Publishing status update");
        let event = Event::status_update(&update);
        self.current.store(Arc::new(update));

        subscribers.retain(|session_id, entry| {
            entry.retain(|s| deliver(session_id, &s.outbox, event.clone()));
            !entry.is_empty()
        });
        true
    }

    /// Run one poll cycle. Returns whether an update was published.
    ///
    /// A lost link publishes the disconnected snapshot. Any other failure,
    /// a timeout behind a slow command included, skips the cycle and keeps
    /// the last snapshot.
    pub async fn poll_once(&self) -> bool {
        if self.connection.link_state() != LinkState::Connected {
            return self.publish(SwitcherStatus::disconnected());
        }

        let tracked = self.resolver.tracked_sources().into_iter().collect();
        match self.connection.query_status(tracked, self.config.query_timeout).await {
            Ok(status) => self.publish(status),
            Err(SwitcherError::Timeout(deadline)) => {
                debug!(?deadline, "Status query timed out, skipping cycle");
                false
            }
            Err(e) if e.is_connection_loss() => {
                debug!(error = %e, "Status query lost the link");
                self.publish(SwitcherStatus::disconnected())
            }
            Err(e) => {
                debug!(error = %e, "Status query failed, skipping cycle");
                false
            }
        }
    }

    /// Poll until `cancel` fires.
    ///
    /// A link drop publishes the disconnected snapshot at once; a reconnect
    /// polls at once instead of waiting for the next tick.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval = ?self.config.poll_interval, "Status broadcaster started");
        let mut link = self.connection.subscribe_link();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = link.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *link.borrow_and_update();
                    match state {
                        LinkState::Disconnected => {
                            self.publish(SwitcherStatus::disconnected());
                        }
                        LinkState::Connected => {
                            self.poll_once().await;
                        }
                        LinkState::Connecting => {}
                    }
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
        info!("Status broadcaster stopped");
    }
}

/// Best-effort delivery. Returns `false` once the connection is gone.
fn deliver(session_id: &str, outbox: &mpsc::Sender<Event>, event: Event) -> bool {
    match outbox.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!(session_id, "Outbox full, dropping event");
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!(session_id, "Subscriber gone, dropping event");
            false
        }
    }
}

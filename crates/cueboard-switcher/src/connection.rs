//! The single shared control connection to the switcher.
//!
//! Every call goes through one gate, so a command or status query has the
//! switcher to itself from its first request to its last. A caller gives up
//! at its deadline, but the gate stays held until the call actually returns.

use std::sync::Arc;
use std::time::Duration;

use cueboard_core::{LinkState, SourceKey, SwitcherCommand, SwitcherStatus, TrackedSource};
use futures::future::BoxFuture;
use rand::Rng;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{SwitcherBackend, SwitcherSession};
use crate::error::{SwitcherError, SwitcherResult};

type Session = Box<dyn SwitcherSession>;

/// A call that has not returned after this many deadlines is treated as a
/// dead link and its session is dropped.
const ABANDON_FACTOR: u32 = 3;

/// Reconnect delay policy: exponential growth capped at `max`, with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed, 0.0 to 1.0
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl Backoff {
    /// Delay before retry `attempt` (0-based), without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.initial.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(raw.min(self.max.as_secs_f64())).unwrap_or(self.max)
    }

    /// Delay before retry `attempt` with jitter applied, never above `max`.
    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 { rng.gen_range((1.0 - jitter)..=(1.0 + jitter)) } else { 1.0 };
        Duration::try_from_secs_f64((base * factor).min(self.max.as_secs_f64())).unwrap_or(self.max)
    }
}

/// Timing knobs for [`SwitcherConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Deadline for commands and inventory queries
    pub command_timeout: Duration,
    /// Deadline for opening a session
    pub connect_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
        }
    }
}

/// Owns the switcher session and its reconnect loop.
pub struct SwitcherConnection {
    backend: Arc<dyn SwitcherBackend>,
    gate: Arc<Mutex<Option<Session>>>,
    link: Arc<watch::Sender<LinkState>>,
    config: ConnectionConfig,
}

impl SwitcherConnection {
    #[must_use]
    pub fn new(backend: Arc<dyn SwitcherBackend>, config: ConnectionConfig) -> Self {
        let (link, _) = watch::channel(LinkState::Disconnected);
        Self { backend, gate: Arc::new(Mutex::new(None)), link: Arc::new(link), config }
    }

    #[must_use]
    pub fn link_state(&self) -> LinkState {
        *self.link.borrow()
    }

    /// Watch link state transitions.
    #[must_use]
    pub fn subscribe_link(&self) -> watch::Receiver<LinkState> {
        self.link.subscribe()
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.config.command_timeout
    }

    /// Run one command under the command deadline.
    ///
    /// # Errors
    /// Fails immediately with [`SwitcherError::NotConnected`] unless the link
    /// is up; returns [`SwitcherError::Timeout`] past the deadline.
    pub async fn execute(&self, command: &SwitcherCommand) -> SwitcherResult<()> {
        let command = command.clone();
        self.call(self.config.command_timeout, move |session| {
            Box::pin(async move { session.execute(&command).await })
        })
        .await
    }

    /// Query output state plus the visibility of each tracked source.
    ///
    /// A tracked source without a scene is looked up in the current program
    /// scene. Sources the switcher does not know about read as hidden.
    ///
    /// # Errors
    /// Same as [`Self::execute`], with `deadline` in place of the command
    /// deadline.
    pub async fn query_status(
        &self,
        tracked: Vec<TrackedSource>,
        deadline: Duration,
    ) -> SwitcherResult<SwitcherStatus> {
        self.call(deadline, move |session| Box::pin(collect_status(session, tracked))).await
    }

    /// Live visibility of a single source.
    ///
    /// # Errors
    /// Same as [`Self::execute`], with `deadline` in place of the command
    /// deadline.
    pub async fn source_visible(&self, scene: &str, source: &str, deadline: Duration) -> SwitcherResult<bool> {
        let (scene, source) = (scene.to_string(), source.to_string());
        self.call(deadline, move |session| Box::pin(async move { session.source_visible(&scene, &source).await }))
            .await
    }

    /// # Errors
    /// Same as [`Self::execute`].
    pub async fn list_scenes(&self) -> SwitcherResult<Vec<String>> {
        self.call(self.config.command_timeout, |session| session.list_scenes()).await
    }

    /// # Errors
    /// Same as [`Self::execute`].
    pub async fn list_inputs(&self) -> SwitcherResult<Vec<String>> {
        self.call(self.config.command_timeout, |session| session.list_inputs()).await
    }

    async fn call<T, F>(&self, deadline: Duration, op: F) -> SwitcherResult<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Session) -> BoxFuture<'a, SwitcherResult<T>> + Send + 'static,
    {
        if self.link_state() != LinkState::Connected {
            return Err(SwitcherError::NotConnected);
        }

        let started = Instant::now();
        let Ok(mut guard) = timeout(deadline, Arc::clone(&self.gate).lock_owned()).await else {
            debug!(?deadline, "Switcher busy past deadline");
            return Err(SwitcherError::Timeout(deadline));
        };
        if guard.is_none() {
            return Err(SwitcherError::NotConnected);
        }

        let remaining = deadline.saturating_sub(started.elapsed());
        let abandon_after = deadline.saturating_mul(ABANDON_FACTOR);
        let link = Arc::clone(&self.link);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = match guard.as_mut() {
                Some(session) => match timeout(abandon_after, op(session)).await {
                    Ok(result) => result,
                    Err(_) => Err(SwitcherError::ConnectionLost(format!("no reply within {abandon_after:?}"))),
                },
                None => Err(SwitcherError::NotConnected),
            };
            if result.as_ref().is_err_and(SwitcherError::is_connection_loss) {
                link.send_replace(LinkState::Disconnected);
                *guard = None;
            }
            drop(guard);
            let _ = tx.send(result);
        });

        match timeout(remaining, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SwitcherError::ConnectionLost("switcher call aborted".to_string())),
            Err(_) => {
                warn!(?deadline, "Switcher call exceeded its deadline");
                Err(SwitcherError::Timeout(deadline))
            }
        }
    }

    fn set_link(&self, state: LinkState) {
        let changed = self.link.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(backend = self.backend.name(), state = ?state, "Switcher link state changed");
        }
    }

    /// Keep the link up until `cancel` fires, reconnecting with backoff.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(backend = self.backend.name(), "Switcher connection manager started");
        let mut attempt: u32 = 0;

        loop {
            self.set_link(LinkState::Connecting);
            let connected = tokio::select! {
                () = cancel.cancelled() => break,
                result = timeout(self.config.connect_timeout, self.backend.connect()) => result,
            };

            match connected {
                Ok(Ok(session)) => {
                    attempt = 0;
                    let closed = session.closed();
                    *self.gate.lock().await = Some(session);
                    self.set_link(LinkState::Connected);

                    let mut link_rx = self.link.subscribe();
                    let lost_in_call = async move {
                        let _ = link_rx.wait_for(|state| *state == LinkState::Disconnected).await;
                    };
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = closed.cancelled() => warn!("Switcher closed the connection"),
                        () = lost_in_call => warn!("Switcher connection lost during a call"),
                    }

                    self.set_link(LinkState::Disconnected);
                    self.gate.lock().await.take();
                }
                Ok(Err(e)) => {
                    self.set_link(LinkState::Disconnected);
                    warn!(attempt, error = %e, "Failed to connect to switcher");
                }
                Err(_) => {
                    self.set_link(LinkState::Disconnected);
                    warn!(attempt, timeout = ?self.config.connect_timeout, "Timed out connecting to switcher");
                }
            }

            let delay = self.config.backoff.delay(attempt, &mut rand::thread_rng());
            attempt = attempt.saturating_add(1);
            debug!(?delay, attempt, "Waiting before reconnecting to switcher");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_link(LinkState::Disconnected);
        self.gate.lock().await.take();
        info!("Switcher connection manager stopped");
    }
}

async fn collect_status(session: &mut Session, tracked: Vec<TrackedSource>) -> SwitcherResult<SwitcherStatus> {
    let mut status = session.status().await?;
    status.connected = true;

    let mut sources = Vec::with_capacity(tracked.len());
    for (scene, source) in tracked {
        let Some(scene) = scene.or_else(|| status.current_scene.clone()) else {
            continue;
        };
        let visible = match session.source_visible(&scene, &source).await {
            Ok(visible) => visible,
            Err(e) if e.is_connection_loss() => return Err(e),
            Err(e) => {
                debug!(scene = %scene, source = %source, error = %e, "Source visibility unavailable");
                false
            }
        };
        sources.push((SourceKey { scene, source }, visible));
    }
    Ok(status.with_sources(sources))
}

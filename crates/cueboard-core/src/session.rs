//! Client sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Whether a session has executed an action yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Bound to a configuration, no action executed yet
    #[default]
    Registered,
    /// At least one action executed
    Active,
}

/// Lifecycle phase of a session at a given instant.
///
/// `Unregistered` and `Reclaimed` have no session record; they are the
/// states before creation and after removal from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Registered,
    Active,
    /// Idle past the TTL, eligible for reclamation
    Stale,
}

/// A server-tracked logical identity for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSession {
    /// Server-assigned identifier
    pub session_id: String,
    /// Caller-supplied identifier, stable across reconnects
    pub client_id: String,
    pub client_name: String,
    /// Bound configuration
    pub config_id: String,
    pub ip_address: String,
    pub last_connected: DateTime<Utc>,
    /// Never moves backwards
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub state: SessionState,
}

impl ClientSession {
    /// Phase of this session at `now` given an idle TTL.
    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>, idle_ttl: Duration) -> SessionPhase {
        if self.is_idle(now, idle_ttl) {
            SessionPhase::Stale
        } else {
            match self.state {
                SessionState::Registered => SessionPhase::Registered,
                SessionState::Active => SessionPhase::Active,
            }
        }
    }

    /// Whether the last touch is older than `idle_ttl`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, idle_ttl: Duration) -> bool {
        now - self.last_active > idle_ttl
    }

    /// Advance `last_active` to `at`, never backwards.
    pub fn touch_at(&mut self, at: DateTime<Utc>) {
        if at > self.last_active {
            self.last_active = at;
        }
    }
}

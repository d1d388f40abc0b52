//! Session registry.
//!
//! Lock order: the registry lock may be held while taking the store lock,
//! never the other way round.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::session::{ClientSession, SessionState};
use crate::store::ConfigurationStore;

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<String, ClientSession>,
    /// `client_id` to `session_id`
    by_client: HashMap<String, String>,
}

impl Sessions {
    fn get_mut(&mut self, session_id: &str) -> Result<&mut ClientSession> {
        self.by_id.get_mut(session_id).ok_or_else(|| Error::Unauthenticated(session_id.to_string()))
    }

    fn remove(&mut self, session_id: &str) -> Option<ClientSession> {
        let session = self.by_id.remove(session_id)?;
        if self.by_client.get(&session.client_id).is_some_and(|id| id == session_id) {
            self.by_client.remove(&session.client_id);
        }
        Some(session)
    }
}

/// Tracks client sessions and the configuration each is bound to.
#[derive(Debug)]
pub struct SessionRegistry {
    store: Arc<ConfigurationStore>,
    sessions: RwLock<Sessions>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(store: Arc<ConfigurationStore>) -> Self {
        Self { store, sessions: RwLock::new(Sessions::default()) }
    }

    /// Register a client, reusing its session if `client_id` is known.
    ///
    /// A reused session keeps its configuration binding; only
    /// `last_connected` and `ip_address` are refreshed. A new session is
    /// bound to the current default configuration.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for an empty `client_id` and
    /// [`Error::NotFound`] when a new session is needed but no default
    /// configuration exists.
    pub fn register(&self, client_id: &str, client_name: &str, ip_address: &str) -> Result<ClientSession> {
        if client_id.trim().is_empty() {
            return Err(Error::validation("client_id", "must not be empty"));
        }
        let now = Utc::now();

        let mut sessions = self.sessions.write();
        if let Some(session_id) = sessions.by_client.get(client_id).cloned() {
            let session = sessions.get_mut(&session_id)?;
            session.last_connected = now;
            session.ip_address = ip_address.to_string();
            if !client_name.is_empty() {
                session.client_name = client_name.to_string();
            }
            session.touch_at(now);
            info!(session_id = %session.session_id, client_id, config_id = %session.config_id, "Client re-registered");
            return Ok(session.clone());
        }

        // Read under the registry lock so a concurrent delete-and-rebind
        // either sees this session or has already promoted a new default.
        let config_id = self
            .store
            .default_configuration()
            .map(|c| c.id)
            .ok_or_else(|| Error::not_found("configuration", "default"))?;
        let session = ClientSession {
            session_id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            client_name: client_name.to_string(),
            config_id,
            ip_address: ip_address.to_string(),
            last_connected: now,
            last_active: now,
            state: SessionState::Registered,
        };
        sessions.by_client.insert(session.client_id.clone(), session.session_id.clone());
        sessions.by_id.insert(session.session_id.clone(), session.clone());

        info!(session_id = %session.session_id, client_id, config_id = %session.config_id, ip = ip_address, "Client registered");
        Ok(session)
    }

    /// Bind a session to another configuration.
    ///
    /// # Errors
    /// Returns [`Error::Unauthenticated`] for an unknown session and
    /// [`Error::NotFound`] for an unknown configuration.
    pub fn bind(&self, session_id: &str, config_id: &str) -> Result<ClientSession> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(session_id)?;
        if !self.store.contains_configuration(config_id) {
            return Err(Error::not_found("configuration", config_id));
        }
        session.config_id = config_id.to_string();
        session.touch_at(Utc::now());
        debug!(session_id, config_id, "Session bound");
        Ok(session.clone())
    }

    /// Record activity on a session.
    ///
    /// # Errors
    /// Returns [`Error::Unauthenticated`] for an unknown session.
    pub fn touch(&self, session_id: &str) -> Result<ClientSession> {
        self.touch_at(session_id, Utc::now())
    }

    /// Record activity on a session at `at`. `last_active` never moves back.
    ///
    /// # Errors
    /// Returns [`Error::Unauthenticated`] for an unknown session.
    pub fn touch_at(&self, session_id: &str, at: DateTime<Utc>) -> Result<ClientSession> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(session_id)?;
        session.touch_at(at);
        Ok(session.clone())
    }

    /// Touch a session and move it to `Active` after a successful action.
    ///
    /// # Errors
    /// Returns [`Error::Unauthenticated`] for an unknown session.
    pub fn mark_active(&self, session_id: &str) -> Result<ClientSession> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(session_id)?;
        session.touch_at(Utc::now());
        if session.state != SessionState::Active {
            session.state = SessionState::Active;
            debug!(session_id, "Session active");
        }
        Ok(session.clone())
    }

    /// Look up a session.
    ///
    /// # Errors
    /// Returns [`Error::Unauthenticated`] for an unknown session.
    pub fn lookup(&self, session_id: &str) -> Result<ClientSession> {
        self.sessions
            .read()
            .by_id
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::Unauthenticated(session_id.to_string()))
    }

    /// All sessions, ordered by client id.
    #[must_use]
    pub fn list(&self) -> Vec<ClientSession> {
        let mut sessions: Vec<_> = self.sessions.read().by_id.values().cloned().collect();
        sessions.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        sessions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move every session bound to `deleted` over to `fallback`.
    ///
    /// Returns the sessions that were rebound.
    pub fn rebind_orphans(&self, deleted: &str, fallback: &str) -> Vec<ClientSession> {
        let mut sessions = self.sessions.write();
        let rebound: Vec<_> = sessions
            .by_id
            .values_mut()
            .filter(|s| s.config_id == deleted)
            .map(|s| {
                s.config_id = fallback.to_string();
                s.clone()
            })
            .collect();
        if !rebound.is_empty() {
            info!(deleted, fallback, count = rebound.len(), "Rebound sessions of deleted configuration");
        }
        rebound
    }

    /// Remove sessions idle for longer than `idle_ttl`.
    pub fn sweep_idle(&self, idle_ttl: Duration) -> Vec<ClientSession> {
        self.sweep_idle_at(Utc::now(), idle_ttl)
    }

    /// Remove sessions idle at `now` for longer than `idle_ttl`.
    ///
    /// Candidates are collected under the read lock; each is checked again
    /// under the write lock before removal, so a session touched in between
    /// survives.
    pub fn sweep_idle_at(&self, now: DateTime<Utc>, idle_ttl: Duration) -> Vec<ClientSession> {
        let candidates: Vec<String> = self
            .sessions
            .read()
            .by_id
            .values()
            .filter(|s| s.is_idle(now, idle_ttl))
            .map(|s| s.session_id.clone())
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut sessions = self.sessions.write();
        let mut reclaimed = Vec::with_capacity(candidates.len());
        for session_id in candidates {
            let still_idle = sessions.by_id.get(&session_id).is_some_and(|s| s.is_idle(now, idle_ttl));
            if still_idle && let Some(session) = sessions.remove(&session_id) {
                info!(session_id = %session.session_id, client_id = %session.client_id, "Session reclaimed");
                reclaimed.push(session);
            }
        }
        reclaimed
    }
}

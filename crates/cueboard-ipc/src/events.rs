//! IPC event types (server to client).

use cueboard_core::StatusUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event pushed from daemon to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

impl Event {
    /// Build an event from any serializable payload.
    pub fn new(event: EventType, data: &impl Serialize) -> Self {
        Self { event, data: serde_json::to_value(data).unwrap_or_default() }
    }

    #[must_use]
    pub fn status_update(update: &StatusUpdate) -> Self {
        Self::new(EventType::StatusUpdate, update)
    }

    #[must_use]
    pub fn configuration_changed(data: &ConfigurationChangedData) -> Self {
        Self::new(EventType::ConfigurationChanged, data)
    }

    #[must_use]
    pub fn config_error(data: &ConfigErrorData) -> Self {
        Self::new(EventType::ConfigError, data)
    }
}

/// Types of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Switcher status changed (per session)
    StatusUpdate,
    /// A button or configuration was edited (all connections)
    ConfigurationChanged,
    /// A session's configuration was deleted and replaced (per session)
    ConfigError,
}

/// What happened to the edited entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Configuration changed event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationChangedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_id: Option<String>,
    pub change: ChangeKind,
}

impl ConfigurationChangedData {
    #[must_use]
    pub fn configuration(config_id: &str, change: ChangeKind) -> Self {
        Self { config_id: Some(config_id.to_string()), button_id: None, change }
    }

    #[must_use]
    pub fn button(button_id: &str, change: ChangeKind) -> Self {
        Self { config_id: None, button_id: Some(button_id.to_string()), change }
    }
}

/// Config error event data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigErrorData {
    pub session_id: String,
    pub deleted_config_id: String,
    pub fallback_config_id: String,
    pub message: String,
}

//! IPC message types.

use cueboard_core::{
    ButtonDraft, ClientSession, ConfigurationDraft, LinkState, RawAction, ResolvedConfiguration,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

impl Response {
    #[must_use]
    pub fn ok(id: u64, value: Value) -> Self {
        Self { id, result: Ok(value) }
    }

    #[must_use]
    pub fn err(id: u64, error: ErrorInfo) -> Self {
        Self { id, result: Err(error) }
    }
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Error class, e.g. `validation_error`
    pub kind: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(code: i32, kind: &str, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), kind: kind.to_string() }
    }

    /// A request line that could not be parsed.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(400, "invalid_request", message)
    }
}

impl From<&cueboard_core::Error> for ErrorInfo {
    fn from(err: &cueboard_core::Error) -> Self {
        Self::new(err.code(), err.kind(), err.to_string())
    }
}

impl From<cueboard_core::Error> for ErrorInfo {
    fn from(err: cueboard_core::Error) -> Self {
        Self::from(&err)
    }
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Method {
    // Sessions
    /// Register a client and bind it to the default configuration
    Register {
        client_id: String,
        #[serde(default)]
        client_name: String,
    },
    /// Bind a session to another configuration
    SelectConfiguration { session_id: String, config_id: String },
    /// Resolved configuration currently bound to a session
    GetSessionConfiguration { session_id: String },
    /// All sessions
    ListSessions,

    // Actions
    /// Run a button action on the switcher
    ExecuteAction { session_id: String, action: RawAction },

    // Status
    /// Latest switcher status snapshot
    GetStatus,
    /// Visibility of a source in a scene
    GetSourceVisibility { scene: String, source: String },
    /// Scene names known to the switcher
    ListScenes,
    /// Input names known to the switcher
    ListInputs,
    /// Service health
    Health,
    /// Version, listen address and inventory counts
    GetServerInfo,

    // Buttons
    ListButtons,
    GetButton { id: String },
    CreateButton { button: ButtonDraft },
    UpdateButton { id: String, button: ButtonDraft },
    DeleteButton { id: String },

    // Configurations
    ListConfigurations,
    GetConfiguration { id: String },
    /// Configuration new sessions are bound to
    GetDefaultConfiguration,
    CreateConfiguration { configuration: ConfigurationDraft },
    UpdateConfiguration { id: String, configuration: ConfigurationDraft },
    /// Delete a configuration; deleting the default needs `promote`
    DeleteConfiguration {
        id: String,
        #[serde(default)]
        promote: Option<String>,
    },
    SetDefaultConfiguration { id: String },

    // Subscriptions
    /// Receive `status_update` and `config_error` events for a session
    Subscribe { session_id: String },
    /// Stop receiving events for a session
    Unsubscribe { session_id: String },
}

/// Result of [`Method::Register`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registered {
    pub session: ClientSession,
    pub configuration: ResolvedConfiguration,
}

/// Result of [`Method::GetSourceVisibility`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVisibilityReply {
    pub scene: String,
    pub source: String,
    pub visible: bool,
}

/// Result of [`Method::Health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub switcher: LinkState,
    pub sessions: usize,
}

/// Result of [`Method::GetServerInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    /// Address the daemon accepts clients on
    pub listen_addr: String,
    pub switcher_connected: bool,
    pub active_sessions: usize,
    pub configurations: usize,
    pub buttons: usize,
}

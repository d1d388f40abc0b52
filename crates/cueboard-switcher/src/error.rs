//! Switcher error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the switcher.
#[derive(Debug, Error)]
pub enum SwitcherError {
    #[error("Not connected to the switcher")]
    NotConnected,

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("{request} rejected by switcher (code {code}): {comment}")]
    Rejected { request: String, code: i64, comment: String },

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwitcherError {
    /// Whether the error means the session is unusable and must be dropped.
    #[must_use]
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::NotConnected | Self::ConnectionLost(_) | Self::WebSocket(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SwitcherError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl From<SwitcherError> for cueboard_core::Error {
    fn from(err: SwitcherError) -> Self {
        match err {
            SwitcherError::Timeout(deadline) => Self::Timeout(deadline),
            SwitcherError::Rejected { .. } | SwitcherError::Protocol(_) | SwitcherError::Json(_) => {
                Self::CommandFailed(err.to_string())
            }
            SwitcherError::NotConnected
            | SwitcherError::ConnectionLost(_)
            | SwitcherError::Handshake(_)
            | SwitcherError::WebSocket(_) => Self::SwitcherUnavailable(err.to_string()),
        }
    }
}

/// Result type for switcher operations.
pub type SwitcherResult<T> = Result<T, SwitcherError>;

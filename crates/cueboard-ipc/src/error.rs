//! IPC error types.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::messages::ErrorInfo;

/// IPC error type.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Framing error: {0}")]
    Codec(#[from] LinesCodecError),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Server error {}: {}", .0.code, .0.message)]
    Server(ErrorInfo),
}

impl IpcError {
    /// Machine-readable kind of a server-side error, if this is one.
    #[must_use]
    pub fn server_kind(&self) -> Option<&str> {
        match self {
            Self::Server(info) => Some(info.kind.as_str()),
            _ => None,
        }
    }
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;

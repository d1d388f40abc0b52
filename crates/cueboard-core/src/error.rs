//! Error types for Cueboard core.

use std::time::Duration;

use thiserror::Error;

/// Core error type shared by the store, resolver, registry and dispatcher.
///
/// Every variant is user-displayable; none of them is fatal to the service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unknown or expired session: {0}")]
    Unauthenticated(String),

    #[error("Switcher unavailable: {0}")]
    SwitcherUnavailable(String),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Switcher rejected command: {0}")]
    CommandFailed(String),
}

impl Error {
    /// Build a validation error for `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), reason: reason.into() }
    }

    /// Build a not-found error for an entity of `kind`.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Stable numeric code used on the wire.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthenticated(_) => 401,
            Self::NotFound { .. } => 404,
            Self::CommandFailed(_) => 502,
            Self::SwitcherUnavailable(_) => 503,
            Self::Timeout(_) => 504,
        }
    }

    /// Short machine-readable name of the error class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::SwitcherUnavailable(_) => "switcher_unavailable",
            Self::Timeout(_) => "timeout",
            Self::CommandFailed(_) => "command_failed",
        }
    }
}

/// Result type alias for Cueboard core operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the core library.

use thiserror::Error;

use crate::service::ServiceError;
use crate::store::StoreError;

/// State an operation needed but did not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// No session identifier is held.
    NoSession,
    /// A session exists but no address has been assigned to it.
    NoAddress,
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSession => write!(f, "no active session"),
            Self::NoAddress => write!(f, "no active email address"),
        }
    }
}

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote call failed (network error, non-success status, bad body).
    #[error("Transport error: {0}")]
    Transport(ServiceError),

    /// The server no longer accepts the session identifier.
    #[error("Session expired")]
    AuthExpired,

    /// Operation attempted without the session state it requires.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(Precondition),

    /// Key-value storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Auto-refresh interval outside one second to one day.
    #[error("Invalid refresh interval: {0} seconds")]
    InvalidInterval(u64),

    /// A newer address generation started; this attempt's result was dropped.
    #[error("Address generation superseded")]
    Superseded,

    /// The configured domain list is empty.
    #[error("No domains configured")]
    NoDomains,

    /// The presentation layer could not complete a request (save, copy).
    #[error("Presenter error: {0}")]
    Presenter(String),
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        if err.is_auth_expired() {
            Self::AuthExpired
        } else {
            Self::Transport(err)
        }
    }
}

impl Error {
    /// Returns true if this error invalidated the session.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

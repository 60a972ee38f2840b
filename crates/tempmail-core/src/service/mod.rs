//! Remote mail service contract.
//!
//! One call per remote capability. Nothing in this layer retries: each call
//! either returns a parsed result or fails with a [`ServiceError`].

mod http;
mod model;

pub use http::HttpMailService;
pub use model::{Attachment, MessageDetail, MessageSummary, Session};

use async_trait::async_trait;
use bytes::Bytes;

/// HTTP status the service uses for a session it no longer recognises.
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// Errors that can occur during a remote call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request could not be sent or the body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// Body arrived but did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Endpoint URL is malformed.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl ServiceError {
    /// HTTP status attached to the failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidResponse(_) | Self::Url(_) => None,
        }
    }

    /// Returns true for a 401-class failure.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        self.status() == Some(STATUS_UNAUTHORIZED)
    }
}

/// The disposable mail provider.
#[async_trait]
pub trait MailService: Send + Sync {
    /// Obtains a new session together with its default address.
    async fn acquire_session(&self) -> Result<Session, ServiceError>;

    /// Binds `local_part@domain` to the session and returns the resulting address.
    async fn assign_address(
        &self,
        session_id: &str,
        local_part: &str,
        domain: &str,
    ) -> Result<String, ServiceError>;

    /// Lists inbox messages starting at `offset`.
    async fn list_messages(
        &self,
        session_id: &str,
        offset: u32,
    ) -> Result<Vec<MessageSummary>, ServiceError>;

    /// Fetches the full content of one message.
    async fn fetch_message(&self, session_id: &str, id: &str)
    -> Result<MessageDetail, ServiceError>;

    /// Downloads one attachment.
    async fn fetch_attachment(
        &self,
        session_id: &str,
        id: &str,
        filename: &str,
    ) -> Result<Bytes, ServiceError>;

    /// Deletes one message.
    async fn delete_message(&self, session_id: &str, id: &str) -> Result<(), ServiceError>;
}

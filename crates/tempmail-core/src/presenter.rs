//! Seam between the controller and whatever renders its results.
//!
//! The controller pushes everything the user sees through this trait; the
//! presenter never reaches back into controller state.

use async_trait::async_trait;
use bytes::Bytes;

use crate::service::{MessageDetail, MessageSummary};

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Operation completed.
    Success,
    /// Progress information.
    Info,
    /// Operation failed.
    Error,
}

/// Transient, auto-dismissing user notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Localized text.
    pub text: String,
}

impl Notice {
    /// Creates a success notice.
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            text: text.into(),
        }
    }

    /// Creates an informational notice.
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    /// Creates an error notice.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}

/// Presentation layer driven by the controller.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Shows a transient notice.
    fn notify(&self, notice: Notice);

    /// Toggles the busy indicator.
    fn set_loading(&self, loading: bool);

    /// Shows the current address (empty when the session was cleared).
    fn show_address(&self, email: &str);

    /// Replaces the rendered inbox with `messages`.
    fn show_messages(&self, messages: &[MessageSummary]);

    /// Opens one message.
    fn show_message(&self, message: &MessageDetail);

    /// Asks the user to confirm a destructive action.
    async fn confirm(&self, prompt: &str) -> bool;

    /// Hands a downloaded attachment to the user.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the file could not be delivered.
    async fn save_attachment(&self, filename: &str, contents: Bytes) -> Result<(), String>;

    /// Places `text` on the clipboard.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if the clipboard is unavailable.
    async fn copy_to_clipboard(&self, text: &str) -> Result<(), String>;
}

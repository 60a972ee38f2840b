//! # tempmail-core
//!
//! Core logic for the tempmail disposable-address client.
//!
//! This crate provides:
//! - Session and mailbox synchronization ([`MailboxController`])
//! - Periodic inbox refresh ([`AutoRefresh`])
//! - An HTTP client for the mail service ([`HttpMailService`])
//! - Key-value persistence of session and preferences
//! - Localized user-facing text
//!
//! Rendering is left to a [`Presenter`] implementation supplied by the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;
pub mod config;
pub mod controller;
mod error;
pub mod i18n;
pub mod presenter;
pub mod scheduler;
pub mod service;
pub mod store;

pub use app::App;
pub use config::{Config, StorageKeys};
pub use controller::{MailboxController, SessionState};
pub use error::{Error, Precondition, Result};
pub use i18n::{Locale, Text};
pub use presenter::{Notice, NoticeLevel, Presenter};
pub use scheduler::{AutoRefresh, RefreshTarget};
pub use service::{
    Attachment, HttpMailService, MailService, MessageDetail, MessageSummary, ServiceError, Session,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, RefreshPreferences, SessionStore, StoreError};

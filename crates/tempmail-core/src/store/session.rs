//! Typed view over the key-value store.

use std::sync::Arc;

use super::{KeyValueStore, StoreError};
use crate::config::{MAX_REFRESH_INTERVAL_SECS, StorageKeys};
use crate::service::Session;

/// Auto-refresh preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPreferences {
    /// Whether the periodic refresh runs.
    pub enabled: bool,
    /// Seconds between refreshes.
    pub interval_secs: u64,
}

/// Session and preference persistence.
///
/// All values are string-encoded. Missing or unparsable preference values fall
/// back to defaults instead of failing.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    default_interval_secs: u64,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("keys", &self.keys)
            .field("default_interval_secs", &self.default_interval_secs)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Wraps a backend.
    #[must_use]
    pub fn new(
        backend: Arc<dyn KeyValueStore>,
        keys: StorageKeys,
        default_interval_secs: u64,
    ) -> Self {
        Self {
            backend,
            keys,
            default_interval_secs,
        }
    }

    /// Interval used when none is persisted.
    #[must_use]
    pub const fn default_interval_secs(&self) -> u64 {
        self.default_interval_secs
    }

    /// Loads the persisted session. Missing fields come back empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn load_session(&self) -> Result<Session, StoreError> {
        Ok(Session {
            session_id: self.backend.get(&self.keys.session)?.unwrap_or_default(),
            email_address: self.backend.get(&self.keys.email)?.unwrap_or_default(),
        })
    }

    /// Persists both session fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        self.backend.set(&self.keys.session, &session.session_id)?;
        self.backend.set(&self.keys.email, &session.email_address)
    }

    /// Persists the current address.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn save_email(&self, email: &str) -> Result<(), StoreError> {
        self.backend.set(&self.keys.email, email)
    }

    /// Removes both session fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.backend.remove(&self.keys.email)?;
        self.backend.remove(&self.keys.session)
    }

    /// Loads auto-refresh preferences.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn load_preferences(&self) -> Result<RefreshPreferences, StoreError> {
        let enabled = self
            .backend
            .get(&self.keys.auto_refresh)?
            .is_some_and(|v| v == "true");
        let interval_secs = self
            .backend
            .get(&self.keys.refresh_interval)?
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| (1..=MAX_REFRESH_INTERVAL_SECS).contains(secs))
            .unwrap_or(self.default_interval_secs);

        Ok(RefreshPreferences {
            enabled,
            interval_secs,
        })
    }

    /// Persists the auto-refresh flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn save_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.backend
            .set(&self.keys.auto_refresh, if enabled { "true" } else { "false" })
    }

    /// Persists the auto-refresh interval.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn save_interval(&self, interval_secs: u64) -> Result<(), StoreError> {
        self.backend
            .set(&self.keys.refresh_interval, &interval_secs.to_string())
    }
}

//! Periodic inbox refresh.
//!
//! [`AutoRefresh`] owns at most one timer task. Enabling, disabling, or
//! changing the interval always stops the previous timer before a new one
//! starts, and the preferences are persisted on every change. The preferences
//! lock is held across both steps so concurrent callers cannot leave the timer
//! out of step with what was stored.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::MAX_REFRESH_INTERVAL_SECS;
use crate::controller::MailboxController;
use crate::error::{Error, Result};
use crate::store::{RefreshPreferences, SessionStore};

/// Something the scheduler can refresh.
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    /// Runs one refresh. Failures are the target's to report.
    async fn refresh(&self);
}

#[async_trait]
impl RefreshTarget for MailboxController {
    async fn refresh(&self) {
        let _ = self.refresh_mail().await;
    }
}

struct Inner {
    target: Arc<dyn RefreshTarget>,
    store: SessionStore,
    preferences: Mutex<RefreshPreferences>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Auto-refresh scheduler.
///
/// Cloning is cheap; all clones control the same timer.
#[derive(Clone)]
pub struct AutoRefresh {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AutoRefresh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoRefresh")
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

impl AutoRefresh {
    /// Creates a stopped scheduler with the store's default preferences.
    ///
    /// Call [`restore`](Self::restore) to apply the persisted preferences.
    #[must_use]
    pub fn new(target: Arc<dyn RefreshTarget>, store: SessionStore) -> Self {
        let preferences = RefreshPreferences {
            enabled: false,
            interval_secs: store.default_interval_secs(),
        };
        Self {
            inner: Arc::new(Inner {
                target,
                store,
                preferences: Mutex::new(preferences),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Loads the persisted preferences and starts the timer if enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the preferences cannot be read.
    pub async fn restore(&self) -> Result<RefreshPreferences> {
        let mut current = self.inner.preferences.lock().await;
        let preferences = self.inner.store.load_preferences()?;
        *current = preferences;
        debug!(
            "Restored auto-refresh: enabled={}, interval={}s",
            preferences.enabled, preferences.interval_secs
        );
        self.apply(preferences).await;
        Ok(preferences)
    }

    /// Turns periodic refresh on or off and persists the choice.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference cannot be stored. The timer state
    /// is updated regardless.
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut current = self.inner.preferences.lock().await;
        current.enabled = enabled;
        self.apply(*current).await;
        info!("Auto-refresh {}", if enabled { "enabled" } else { "disabled" });
        self.inner.store.save_enabled(enabled)?;
        Ok(())
    }

    /// Changes the refresh period, restarting the timer when it runs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` for zero seconds or more than one day (nothing
    /// changes then), or a storage error.
    pub async fn set_interval(&self, interval_secs: u64) -> Result<()> {
        if !(1..=MAX_REFRESH_INTERVAL_SECS).contains(&interval_secs) {
            return Err(Error::InvalidInterval(interval_secs));
        }
        let mut current = self.inner.preferences.lock().await;
        current.interval_secs = interval_secs;
        self.apply(*current).await;
        info!("Auto-refresh interval set to {}s", interval_secs);
        self.inner.store.save_interval(interval_secs)?;
        Ok(())
    }

    /// Current preferences.
    pub async fn preferences(&self) -> RefreshPreferences {
        *self.inner.preferences.lock().await
    }

    /// Returns true while a timer is running.
    pub async fn is_active(&self) -> bool {
        self.inner
            .timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the timer without touching the persisted preferences.
    pub async fn stop(&self) {
        if let Some(handle) = self.inner.timer.lock().await.take() {
            handle.abort();
            debug!("Auto-refresh timer stopped");
        }
    }

    /// Replaces the timer. Callers hold the preferences lock.
    async fn apply(&self, preferences: RefreshPreferences) {
        let mut timer = self.inner.timer.lock().await;
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        if !preferences.enabled || preferences.interval_secs == 0 {
            return;
        }

        let period = Duration::from_secs(preferences.interval_secs);
        let target = Arc::clone(&self.inner.target);
        *timer = Some(tokio::spawn(run_timer(target, period)));
        debug!("Auto-refresh timer started every {:?}", period);
    }
}

/// Fires one refresh per period, starting one period from now.
async fn run_timer(target: Arc<dyn RefreshTarget>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick_count = 0u64;
    loop {
        ticker.tick().await;
        tick_count += 1;
        debug!("Auto-refresh tick #{}", tick_count);

        // A slow refresh must not hold back the next tick
        let target = Arc::clone(&target);
        tokio::spawn(async move { target.refresh().await });
    }
}

//! Wiring of controller and scheduler.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::controller::MailboxController;
use crate::error::Result;
use crate::presenter::Presenter;
use crate::scheduler::AutoRefresh;
use crate::service::MailService;
use crate::store::{KeyValueStore, SessionStore};

/// A controller and its auto-refresh scheduler sharing one store.
#[derive(Debug, Clone)]
pub struct App {
    controller: MailboxController,
    scheduler: AutoRefresh,
}

impl App {
    /// Builds the controller and scheduler over the given collaborators.
    #[must_use]
    pub fn new(
        config: Config,
        service: Arc<dyn MailService>,
        presenter: Arc<dyn Presenter>,
        backend: Arc<dyn KeyValueStore>,
    ) -> Self {
        let store = SessionStore::new(
            backend,
            config.keys.clone(),
            config.default_refresh_interval_secs,
        );
        let controller = MailboxController::new(config, service, store.clone(), presenter);
        let scheduler = AutoRefresh::new(Arc::new(controller.clone()), store);
        Self {
            controller,
            scheduler,
        }
    }

    /// Restores auto-refresh preferences, then resumes or creates a session.
    ///
    /// A failed first refresh or generation is reported through the presenter
    /// and does not fail startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted preferences cannot be read.
    pub async fn start(&self) -> Result<()> {
        let preferences = self.scheduler.restore().await?;
        info!(
            "Starting with auto-refresh {} ({}s)",
            if preferences.enabled { "on" } else { "off" },
            preferences.interval_secs
        );
        if let Err(e) = self.controller.init().await {
            warn!("Initial mailbox load failed: {}", e);
        }
        Ok(())
    }

    /// The mailbox controller.
    #[must_use]
    pub const fn controller(&self) -> &MailboxController {
        &self.controller
    }

    /// The auto-refresh scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &AutoRefresh {
        &self.scheduler
    }
}

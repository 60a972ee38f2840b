//! Session and mailbox synchronization.
//!
//! [`MailboxController`] owns the session identifier, the current address and
//! the latest inbox snapshot. It is the only writer of session keys in the
//! store, and it surfaces every failure to the [`Presenter`] as a notice before
//! returning it.
//!
//! Every generation attempt takes a new epoch. Results are committed under the
//! state lock only while their epoch is still the latest, so a slow automatic
//! retry cannot overwrite the session a later attempt or a reset produced.
//! Likewise an expired-session answer only clears the session it was sent for.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Precondition, Result};
use crate::i18n::Text;
use crate::presenter::{Notice, Presenter};
use crate::service::{MailService, MessageDetail, MessageSummary, ServiceError, Session};
use crate::store::SessionStore;

/// Characters used for generated local parts.
const LOCAL_PART_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of generated local parts.
const LOCAL_PART_LEN: usize = 6;

/// Observable lifecycle of the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session identifier is held.
    NoSession,
    /// An address is being generated (session acquisition included).
    Acquiring,
    /// A session exists without an address.
    HasSessionNoAddress,
    /// Session and address are both present.
    HasAddress,
    /// At least one inbox refresh is in flight.
    Refreshing,
}

#[derive(Debug, Default)]
struct MailboxState {
    session_id: String,
    current_email: String,
    messages: Vec<MessageSummary>,
    generating: bool,
    refreshes_in_flight: usize,
    /// Epoch of the latest generation attempt or reset.
    generation: u64,
}

impl MailboxState {
    const fn session_state(&self) -> SessionState {
        if self.generating {
            SessionState::Acquiring
        } else if self.session_id.is_empty() {
            SessionState::NoSession
        } else if self.current_email.is_empty() {
            SessionState::HasSessionNoAddress
        } else if self.refreshes_in_flight > 0 {
            SessionState::Refreshing
        } else {
            SessionState::HasAddress
        }
    }
}

struct Inner {
    config: Config,
    service: Arc<dyn MailService>,
    store: SessionStore,
    presenter: Arc<dyn Presenter>,
    state: Mutex<MailboxState>,
    /// Pending delayed generation retry. At most one.
    retry: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the mailbox state machine.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct MailboxController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MailboxController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxController")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl MailboxController {
    /// Creates a controller with an empty in-memory session.
    ///
    /// Call [`init`](Self::init) to resume the persisted session.
    #[must_use]
    pub fn new(
        config: Config,
        service: Arc<dyn MailService>,
        store: SessionStore,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                service,
                store,
                presenter,
                state: Mutex::new(MailboxState::default()),
                retry: Mutex::new(None),
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.lock_state().await.session_state()
    }

    /// Current address, empty when none.
    pub async fn current_email(&self) -> String {
        self.lock_state().await.current_email.clone()
    }

    /// Current session identifier, empty when none.
    pub async fn session_id(&self) -> String {
        self.lock_state().await.session_id.clone()
    }

    /// Latest inbox snapshot.
    pub async fn messages(&self) -> Vec<MessageSummary> {
        self.lock_state().await.messages.clone()
    }

    /// Returns true while a delayed generation retry is waiting to fire.
    pub async fn has_pending_retry(&self) -> bool {
        self.inner
            .retry
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Resumes the persisted session, or generates a fresh address.
    ///
    /// # Errors
    ///
    /// Returns the error of the refresh or generation that was started.
    pub async fn init(&self) -> Result<()> {
        let persisted = self.inner.store.load_session().unwrap_or_else(|e| {
            warn!("Failed to load persisted session: {}", e);
            Session::default()
        });

        // An address without its session is useless
        let session = if persisted.session_id.is_empty() {
            Session::default()
        } else {
            persisted
        };

        {
            let mut state = self.lock_state().await;
            state.session_id.clone_from(&session.session_id);
            state.current_email.clone_from(&session.email_address);
        }

        if session.is_complete() {
            info!("Resuming session for {}", session.email_address);
            self.inner.presenter.show_address(&session.email_address);
            self.refresh_mail().await.map(|_| ())
        } else {
            info!("No usable session stored, generating an address");
            self.gen_email().await.map(|_| ())
        }
    }

    /// Generates a new random address, acquiring a session first if needed.
    ///
    /// Cancels any pending automatic retry before starting. On failure the
    /// session is cleared and one retry is scheduled after the configured delay.
    ///
    /// # Errors
    ///
    /// Returns the failure of session acquisition or address assignment.
    pub async fn gen_email(&self) -> Result<String> {
        self.cancel_retry().await;
        self.generate().await
    }

    async fn generate(&self) -> Result<String> {
        self.inner.presenter.set_loading(true);
        let epoch = {
            let mut state = self.lock_state().await;
            state.generation += 1;
            state.generating = true;
            state.generation
        };

        let result = self.try_generate(epoch).await;

        {
            let mut state = self.lock_state().await;
            if state.generation == epoch {
                state.generating = false;
            }
        }
        self.inner.presenter.set_loading(false);

        match result {
            Ok(email) => {
                info!("Generated address {}", email);
                self.inner
                    .presenter
                    .notify(Notice::success(self.text(Text::AddressCreated)));
                // Refresh failures are already reported to the presenter
                let _ = self.refresh_mail().await;
                Ok(email)
            }
            Err(Error::Superseded) => {
                debug!("Dropped result of superseded generation #{}", epoch);
                Err(Error::Superseded)
            }
            Err(err) => {
                if !self
                    .clear_session_where(|state| state.generation == epoch)
                    .await
                {
                    debug!("Ignoring failure of superseded generation: {}", err);
                    return Err(err);
                }
                warn!("Address generation failed: {}", err);
                self.inner.presenter.notify(Notice::error(format!(
                    "{}: {err}",
                    self.text(Text::AddressFailed)
                )));
                self.schedule_retry().await;
                Err(err)
            }
        }
    }

    async fn try_generate(&self, epoch: u64) -> Result<String> {
        let mut session_id = self.lock_state().await.session_id.clone();

        if session_id.is_empty() {
            let session = self.inner.service.acquire_session().await?;
            {
                let mut state = self.lock_state().await;
                if state.generation != epoch {
                    return Err(Error::Superseded);
                }
                self.inner.store.save_session(&session)?;
                state.session_id.clone_from(&session.session_id);
                state.current_email.clone_from(&session.email_address);
            }
            debug!("Acquired session for {}", session.email_address);
            session_id = session.session_id;
        }

        let local_part = random_local_part();
        let domain = self.pick_domain()?;
        let email = self
            .inner
            .service
            .assign_address(&session_id, &local_part, &domain)
            .await?;
        if email.is_empty() {
            return Err(Error::Transport(ServiceError::InvalidResponse(
                "empty email_addr".to_string(),
            )));
        }

        {
            let mut state = self.lock_state().await;
            // The session may also have expired while the call was out
            if state.generation != epoch || state.session_id != session_id {
                return Err(Error::Superseded);
            }
            self.inner.store.save_email(&email)?;
            state.current_email.clone_from(&email);
        }
        self.inner.presenter.show_address(&email);
        Ok(email)
    }

    fn pick_domain(&self) -> Result<String> {
        self.inner
            .config
            .domains
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(Error::NoDomains)
    }

    /// Replaces the pending retry (if any) with a new one.
    async fn schedule_retry(&self) {
        let delay = self.inner.config.retry_delay;
        let controller = self.clone();

        let mut slot = self.inner.retry.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        debug!("Scheduling address generation retry in {:?}", delay);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Leave the slot empty so a new failure can schedule again
            controller.inner.retry.lock().await.take();
            controller.retry_generation().await;
        }));
    }

    fn retry_generation(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            info!("Retrying address generation");
            let _ = self.generate().await;
        })
    }

    async fn cancel_retry(&self) {
        if let Some(handle) = self.inner.retry.lock().await.take() {
            handle.abort();
            debug!("Cancelled pending generation retry");
        }
    }

    /// Fetches the first page of the inbox and replaces the snapshot.
    ///
    /// Concurrent refreshes are not serialized; the last response to arrive
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` without any remote call when session or
    /// address is missing, `AuthExpired` after clearing the session, or the
    /// transport failure (snapshot left untouched).
    pub async fn refresh_mail(&self) -> Result<Vec<MessageSummary>> {
        let session_id = {
            let mut state = self.lock_state().await;
            if state.session_id.is_empty() || state.current_email.is_empty() {
                let missing = if state.session_id.is_empty() {
                    Precondition::NoSession
                } else {
                    Precondition::NoAddress
                };
                drop(state);
                return Err(self.precondition(missing, Text::NoMailSession));
            }
            state.refreshes_in_flight += 1;
            state.session_id.clone()
        };

        self.inner.presenter.set_loading(true);
        let result = self.inner.service.list_messages(&session_id, 0).await;
        {
            let mut state = self.lock_state().await;
            state.refreshes_in_flight = state.refreshes_in_flight.saturating_sub(1);
        }
        self.inner.presenter.set_loading(false);

        match result {
            Ok(messages) => {
                {
                    let mut state = self.lock_state().await;
                    if state.session_id != session_id {
                        debug!("Dropping inbox of a replaced session");
                        return Ok(messages);
                    }
                    state.messages.clone_from(&messages);
                }
                debug!("Inbox refreshed: {} messages", messages.len());
                self.inner.presenter.show_messages(&messages);
                Ok(messages)
            }
            Err(err) => Err(self
                .fail(err.into(), Text::FetchListFailed, &session_id)
                .await),
        }
    }

    /// Fetches one message and hands it to the presenter.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` without a session, otherwise the remote failure.
    pub async fn view_email(&self, id: &str) -> Result<MessageDetail> {
        let session_id = self.require_session().await?;

        self.inner.presenter.set_loading(true);
        let result = self.inner.service.fetch_message(&session_id, id).await;
        self.inner.presenter.set_loading(false);

        match result {
            Ok(message) => {
                self.inner.presenter.show_message(&message);
                Ok(message)
            }
            Err(err) => Err(self
                .fail(err.into(), Text::LoadMessageFailed, &session_id)
                .await),
        }
    }

    /// Downloads one attachment and hands it to the presenter for saving.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` without a session, the remote failure, or
    /// `Presenter` when the file could not be delivered.
    pub async fn download_attachment(&self, id: &str, filename: &str) -> Result<()> {
        let session_id = self.require_session().await?;

        self.inner
            .presenter
            .notify(Notice::info(self.text(Text::DownloadingAttachment)));

        let contents = match self
            .inner
            .service
            .fetch_attachment(&session_id, id, filename)
            .await
        {
            Ok(contents) => contents,
            Err(err) => {
                return Err(self
                    .fail(err.into(), Text::AttachmentFailed, &session_id)
                    .await);
            }
        };

        if let Err(reason) = self
            .inner
            .presenter
            .save_attachment(filename, contents)
            .await
        {
            return Err(self
                .fail(Error::Presenter(reason), Text::AttachmentFailed, &session_id)
                .await);
        }

        info!("Saved attachment {} of message {}", filename, id);
        self.inner
            .presenter
            .notify(Notice::success(self.text(Text::AttachmentSaved)));
        Ok(())
    }

    /// Deletes one message after user confirmation, then refreshes once.
    ///
    /// Returns `Ok(false)` when the user declined; nothing is sent then.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` without a session, otherwise the remote
    /// failure of the delete call (the follow-up refresh still runs).
    pub async fn delete_email(&self, id: &str) -> Result<bool> {
        let session_id = self.require_session().await?;

        if !self
            .inner
            .presenter
            .confirm(self.text(Text::ConfirmDelete))
            .await
        {
            debug!("Delete of {} declined", id);
            return Ok(false);
        }

        let result = self.inner.service.delete_message(&session_id, id).await;
        let outcome = match result {
            Ok(()) => {
                info!("Deleted message {}", id);
                self.inner
                    .presenter
                    .notify(Notice::success(self.text(Text::MessageDeleted)));
                Ok(true)
            }
            Err(err) => Err(self
                .fail(err.into(), Text::DeleteFailed, &session_id)
                .await),
        };

        // The list only reflects the removal after a fresh listing
        let _ = self.refresh_mail().await;
        outcome
    }

    /// Hands the current address to the presenter's clipboard.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` without an address, or `Presenter` when the
    /// clipboard rejected it.
    pub async fn copy_email(&self) -> Result<()> {
        let email = self.current_email().await;
        if email.is_empty() {
            return Err(self.precondition(Precondition::NoAddress, Text::NoAddressToCopy));
        }

        match self.inner.presenter.copy_to_clipboard(&email).await {
            Ok(()) => {
                self.inner
                    .presenter
                    .notify(Notice::success(self.text(Text::AddressCopied)));
                Ok(())
            }
            Err(reason) => {
                self.inner.presenter.notify(Notice::error(format!(
                    "{}: {reason}",
                    self.text(Text::CopyFailed)
                )));
                Err(Error::Presenter(reason))
            }
        }
    }

    /// Drops the session, the snapshot, and any pending retry.
    ///
    /// A generation still in flight is superseded and its result dropped.
    pub async fn reset_session(&self) {
        self.cancel_retry().await;
        {
            let mut state = self.lock_state().await;
            state.generation += 1;
            state.generating = false;
            state.messages.clear();
        }
        self.clear_session_where(|_| true).await;
        self.inner.presenter.show_messages(&[]);
        self.inner
            .presenter
            .notify(Notice::info(self.text(Text::SessionReset)));
        info!("Session reset");
    }

    /// Messages of the current snapshot matching `query` (case-insensitive
    /// over id, sender, and subject). An empty query matches everything.
    pub async fn search(&self, query: &str) -> Vec<MessageSummary> {
        let needle = query.trim().to_lowercase();
        let state = self.lock_state().await;
        if needle.is_empty() {
            return state.messages.clone();
        }
        state
            .messages
            .iter()
            .filter(|message| message.matches(&needle))
            .cloned()
            .collect()
    }

    async fn require_session(&self) -> Result<String> {
        let session_id = self.session_id().await;
        if session_id.is_empty() {
            return Err(self.precondition(Precondition::NoSession, Text::NoSession));
        }
        Ok(session_id)
    }

    fn precondition(&self, missing: Precondition, text: Text) -> Error {
        debug!("Precondition failed: {}", missing);
        self.inner.presenter.notify(Notice::error(self.text(text)));
        Error::PreconditionFailed(missing)
    }

    /// Reports a failure of a call made for `session_id`.
    ///
    /// An expired session is cleared as well, unless it was already replaced.
    async fn fail(&self, err: Error, text: Text, session_id: &str) -> Error {
        warn!("{}: {}", self.text(text), err);
        self.inner.presenter.notify(Notice::error(self.text(text)));
        if err.is_auth_expired() {
            if self
                .clear_session_where(|state| state.session_id == session_id)
                .await
            {
                self.inner
                    .presenter
                    .notify(Notice::error(self.text(Text::SessionExpired)));
            } else {
                debug!("Ignoring expiry of a replaced session");
            }
        }
        err
    }

    /// Clears session, address and their stored keys if `still_current` holds.
    ///
    /// The check and both writes happen under the state lock. Returns whether
    /// anything was cleared.
    async fn clear_session_where(
        &self,
        still_current: impl FnOnce(&MailboxState) -> bool + Send,
    ) -> bool {
        {
            let mut state = self.lock_state().await;
            if !still_current(&state) {
                return false;
            }
            state.session_id.clear();
            state.current_email.clear();
            if let Err(e) = self.inner.store.clear_session() {
                warn!("Failed to clear persisted session: {}", e);
            }
        }
        self.inner.presenter.show_address("");
        true
    }

    async fn lock_state(&self) -> MutexGuard<'_, MailboxState> {
        self.inner.state.lock().await
    }

    fn text(&self, key: Text) -> &'static str {
        self.inner.config.locale.text(key)
    }
}

fn random_local_part() -> String {
    let mut rng = rand::thread_rng();
    (0..LOCAL_PART_LEN)
        .map(|_| char::from(LOCAL_PART_CHARSET[rng.gen_range(0..LOCAL_PART_CHARSET.len())]))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::presenter::NoticeLevel;
    use crate::service::Attachment;
    use crate::store::{KeyValueStore, MemoryStore};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const RETRY_DELAY: Duration = Duration::from_secs(5);

    fn failure() -> ServiceError {
        ServiceError::InvalidResponse("connection reset".to_string())
    }

    /// Mail service answering from scripted queues.
    #[derive(Default)]
    struct FakeService {
        acquire: StdMutex<VecDeque<std::result::Result<Session, ServiceError>>>,
        assign: StdMutex<VecDeque<std::result::Result<String, ServiceError>>>,
        list: StdMutex<VecDeque<std::result::Result<Vec<MessageSummary>, ServiceError>>>,
        fetch: StdMutex<VecDeque<std::result::Result<MessageDetail, ServiceError>>>,
        delete: StdMutex<VecDeque<std::result::Result<(), ServiceError>>>,
        calls: StdMutex<Vec<(&'static str, Vec<String>)>>,
        /// One-shot latencies, taken by the next call of that name.
        delays: StdMutex<Vec<(&'static str, Duration)>>,
    }

    impl FakeService {
        fn delay_next(&self, name: &'static str, delay: Duration) {
            self.delays.lock().unwrap().push((name, delay));
        }

        /// Sleeps for the first delay registered for `name`, if any.
        async fn latency(&self, name: &str) {
            let delay = {
                let mut delays = self.delays.lock().unwrap();
                delays
                    .iter()
                    .position(|(n, _)| *n == name)
                    .map(|i| delays.remove(i).1)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        fn record(&self, name: &'static str, args: &[&str]) {
            self.calls
                .lock()
                .unwrap()
                .push((name, args.iter().map(|a| (*a).to_string()).collect()));
        }

        fn calls(&self, name: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| *n == name)
                .count()
        }

        fn args(&self, name: &str) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _)| *n == name)
                .map(|(_, a)| a.clone())
                .collect()
        }

        fn push_acquire(&self, result: std::result::Result<Session, ServiceError>) {
            self.acquire.lock().unwrap().push_back(result);
        }

        fn push_assign(&self, result: std::result::Result<String, ServiceError>) {
            self.assign.lock().unwrap().push_back(result);
        }

        fn push_list(&self, result: std::result::Result<Vec<MessageSummary>, ServiceError>) {
            self.list.lock().unwrap().push_back(result);
        }

        fn push_fetch(&self, result: std::result::Result<MessageDetail, ServiceError>) {
            self.fetch.lock().unwrap().push_back(result);
        }

        fn push_delete(&self, result: std::result::Result<(), ServiceError>) {
            self.delete.lock().unwrap().push_back(result);
        }
    }

    #[async_trait]
    impl MailService for FakeService {
        async fn acquire_session(&self) -> std::result::Result<Session, ServiceError> {
            self.record("acquire", &[]);
            let result = self
                .acquire
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Status(503)));
            self.latency("acquire").await;
            result
        }

        async fn assign_address(
            &self,
            session_id: &str,
            local_part: &str,
            domain: &str,
        ) -> std::result::Result<String, ServiceError> {
            self.record("assign", &[session_id, local_part, domain]);
            let result = self
                .assign
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Status(503)));
            self.latency("assign").await;
            result
        }

        async fn list_messages(
            &self,
            session_id: &str,
            offset: u32,
        ) -> std::result::Result<Vec<MessageSummary>, ServiceError> {
            self.record("list", &[session_id, &offset.to_string()]);
            let result = self
                .list
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            self.latency("list").await;
            result
        }

        async fn fetch_message(
            &self,
            session_id: &str,
            id: &str,
        ) -> std::result::Result<MessageDetail, ServiceError> {
            self.record("fetch", &[session_id, id]);
            self.fetch
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Status(404)))
        }

        async fn fetch_attachment(
            &self,
            session_id: &str,
            id: &str,
            filename: &str,
        ) -> std::result::Result<Bytes, ServiceError> {
            self.record("attachment", &[session_id, id, filename]);
            Ok(Bytes::from_static(b"PDF-DATA"))
        }

        async fn delete_message(
            &self,
            session_id: &str,
            id: &str,
        ) -> std::result::Result<(), ServiceError> {
            self.record("delete", &[session_id, id]);
            self.delete.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    /// Presenter that records everything it is asked to show.
    struct RecordingPresenter {
        notices: StdMutex<Vec<Notice>>,
        addresses: StdMutex<Vec<String>>,
        snapshots: StdMutex<Vec<Vec<MessageSummary>>>,
        opened: StdMutex<Vec<MessageDetail>>,
        saved: StdMutex<Vec<(String, Bytes)>>,
        copied: StdMutex<Vec<String>>,
        confirm_answer: AtomicBool,
    }

    impl Default for RecordingPresenter {
        fn default() -> Self {
            Self {
                notices: StdMutex::default(),
                addresses: StdMutex::default(),
                snapshots: StdMutex::default(),
                opened: StdMutex::default(),
                saved: StdMutex::default(),
                copied: StdMutex::default(),
                confirm_answer: AtomicBool::new(true),
            }
        }
    }

    impl RecordingPresenter {
        fn last_address(&self) -> Option<String> {
            self.addresses.lock().unwrap().last().cloned()
        }

        fn count_notices(&self, level: NoticeLevel, text: &str) -> usize {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.level == level && n.text.starts_with(text))
                .count()
        }

        fn has_notice(&self, level: NoticeLevel, text: &str) -> bool {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .any(|n| n.level == level && n.text.starts_with(text))
        }
    }

    #[async_trait]
    impl Presenter for RecordingPresenter {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }

        fn set_loading(&self, _loading: bool) {}

        fn show_address(&self, email: &str) {
            self.addresses.lock().unwrap().push(email.to_string());
        }

        fn show_messages(&self, messages: &[MessageSummary]) {
            self.snapshots.lock().unwrap().push(messages.to_vec());
        }

        fn show_message(&self, message: &MessageDetail) {
            self.opened.lock().unwrap().push(message.clone());
        }

        async fn confirm(&self, _prompt: &str) -> bool {
            self.confirm_answer.load(Ordering::SeqCst)
        }

        async fn save_attachment(
            &self,
            filename: &str,
            contents: Bytes,
        ) -> std::result::Result<(), String> {
            self.saved
                .lock()
                .unwrap()
                .push((filename.to_string(), contents));
            Ok(())
        }

        async fn copy_to_clipboard(&self, text: &str) -> std::result::Result<(), String> {
            self.copied.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        controller: MailboxController,
        service: Arc<FakeService>,
        presenter: Arc<RecordingPresenter>,
        backend: Arc<MemoryStore>,
    }

    fn test_config() -> Config {
        Config {
            domains: vec!["x.com".to_string()],
            retry_delay: RETRY_DELAY,
            ..Config::default()
        }
    }

    fn harness_with(entries: &[(&str, &str)]) -> Harness {
        let config = test_config();
        let service = Arc::new(FakeService::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let backend = Arc::new(MemoryStore::with_entries(entries.iter().copied()));
        let store = SessionStore::new(
            backend.clone(),
            config.keys.clone(),
            config.default_refresh_interval_secs,
        );
        let controller =
            MailboxController::new(config, service.clone(), store, presenter.clone());
        Harness {
            controller,
            service,
            presenter,
            backend,
        }
    }

    fn harness() -> Harness {
        harness_with(&[])
    }

    /// Harness whose controller already holds `S1` / `a@x.com`.
    async fn active_harness() -> Harness {
        let h = harness_with(&[
            ("tempmail_session", "S1"),
            ("tempmail_email", "a@x.com"),
        ]);
        h.controller.init().await.unwrap();
        h
    }

    fn summary(id: &str, subject: &str) -> MessageSummary {
        MessageSummary {
            id: id.to_string(),
            from: "sender@example.com".to_string(),
            subject: subject.to_string(),
            timestamp_secs: 1_700_000_000,
        }
    }

    fn stored(h: &Harness, key: &str) -> Option<String> {
        h.backend.get(key).unwrap()
    }

    #[tokio::test]
    async fn test_gen_email_acquires_then_assigns() {
        let h = harness();
        h.service.push_acquire(Ok(Session::new("S1", "a@x.com")));
        h.service.push_assign(Ok("b@x.com".to_string()));

        let email = h.controller.gen_email().await.unwrap();

        assert_eq!(email, "b@x.com");
        assert_eq!(h.controller.current_email().await, "b@x.com");
        assert_eq!(h.controller.session_id().await, "S1");
        assert_eq!(h.controller.state().await, SessionState::HasAddress);
        assert_eq!(stored(&h, "tempmail_session").as_deref(), Some("S1"));
        assert_eq!(stored(&h, "tempmail_email").as_deref(), Some("b@x.com"));
        assert_eq!(h.presenter.last_address().as_deref(), Some("b@x.com"));
        assert!(h.presenter.has_notice(NoticeLevel::Success, "New email address created"));

        // Exactly one refresh follows a successful generation
        assert_eq!(h.service.calls("list"), 1);
        assert!(!h.controller.has_pending_retry().await);
    }

    #[tokio::test]
    async fn test_gen_email_random_local_part_and_domain() {
        let h = harness();
        h.service.push_acquire(Ok(Session::new("S1", "a@x.com")));
        h.service.push_assign(Ok("b@x.com".to_string()));

        h.controller.gen_email().await.unwrap();

        let args = h.service.args("assign");
        assert_eq!(args.len(), 1);
        let (session_id, local_part, domain) = (&args[0][0], &args[0][1], &args[0][2]);
        assert_eq!(session_id, "S1");
        assert_eq!(local_part.len(), LOCAL_PART_LEN);
        assert!(
            local_part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
        assert_eq!(domain, "x.com");
    }

    #[tokio::test]
    async fn test_gen_email_reuses_existing_session() {
        let h = active_harness().await;
        h.service.push_assign(Ok("c@x.com".to_string()));

        h.controller.gen_email().await.unwrap();

        assert_eq!(h.service.calls("acquire"), 0);
        assert_eq!(h.controller.current_email().await, "c@x.com");
        assert_eq!(stored(&h, "tempmail_session").as_deref(), Some("S1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gen_email_failure_clears_session_and_retries() {
        let h = harness();
        h.service.push_acquire(Ok(Session::new("S1", "a@x.com")));
        h.service.push_assign(Err(failure()));

        let err = h.controller.gen_email().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(h.controller.state().await, SessionState::NoSession);
        assert!(h.controller.session_id().await.is_empty());
        assert!(h.controller.current_email().await.is_empty());
        assert_eq!(stored(&h, "tempmail_session"), None);
        assert_eq!(stored(&h, "tempmail_email"), None);
        assert!(h.presenter.has_notice(NoticeLevel::Error, "Failed to create"));
        assert!(h.controller.has_pending_retry().await);
        assert_eq!(h.service.calls("list"), 0);

        // The retry starts from scratch and succeeds
        h.service.push_acquire(Ok(Session::new("S2", "d@x.com")));
        h.service.push_assign(Ok("e@x.com".to_string()));
        tokio::time::sleep(RETRY_DELAY * 2).await;

        assert_eq!(h.service.calls("acquire"), 2);
        assert_eq!(h.controller.current_email().await, "e@x.com");
        assert_eq!(h.controller.session_id().await, "S2");
        assert_eq!(stored(&h, "tempmail_email").as_deref(), Some("e@x.com"));
        assert_eq!(h.presenter.last_address().as_deref(), Some("e@x.com"));
        assert!(!h.controller.has_pending_retry().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_for_delay() {
        let h = harness();
        // acquire fails by default

        let _ = h.controller.gen_email().await;
        assert_eq!(h.service.calls("acquire"), 1);

        tokio::time::sleep(RETRY_DELAY / 2).await;
        assert_eq!(h.service.calls("acquire"), 1);

        tokio::time::sleep(RETRY_DELAY).await;
        assert_eq!(h.service.calls("acquire"), 2);

        // A failed retry schedules exactly one more
        assert!(h.controller.has_pending_retry().await);
        h.controller.reset_session().await;
        assert!(!h.controller.has_pending_retry().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_generation_cancels_pending_retry() {
        let h = harness();
        let _ = h.controller.gen_email().await;
        assert!(h.controller.has_pending_retry().await);

        h.service.push_acquire(Ok(Session::new("S1", "a@x.com")));
        h.service.push_assign(Ok("b@x.com".to_string()));
        h.controller.gen_email().await.unwrap();
        assert!(!h.controller.has_pending_retry().await);

        tokio::time::sleep(RETRY_DELAY * 3).await;
        assert_eq!(h.service.calls("acquire"), 2);
        assert_eq!(h.controller.current_email().await, "b@x.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_generation_supersedes_running_retry() {
        let h = harness();
        let _ = h.controller.gen_email().await;

        // The retry acquires slowly; the user's own attempt is fast
        h.service.push_acquire(Ok(Session::new("S_RETRY", "r@x.com")));
        h.service.push_acquire(Ok(Session::new("S_USER", "u@x.com")));
        h.service.push_assign(Ok("user@x.com".to_string()));
        h.service.push_assign(Ok("retry@x.com".to_string()));
        h.service.delay_next("acquire", Duration::from_secs(10));
        tokio::time::sleep(RETRY_DELAY + Duration::from_millis(100)).await;
        assert_eq!(h.service.calls("acquire"), 2);
        assert_eq!(h.controller.state().await, SessionState::Acquiring);

        let email = h.controller.gen_email().await.unwrap();
        assert_eq!(email, "user@x.com");

        // The retry's late session is dropped
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(h.controller.session_id().await, "S_USER");
        assert_eq!(h.controller.current_email().await, "user@x.com");
        assert_eq!(h.controller.state().await, SessionState::HasAddress);
        assert_eq!(stored(&h, "tempmail_session").as_deref(), Some("S_USER"));
        assert_eq!(stored(&h, "tempmail_email").as_deref(), Some("user@x.com"));
        assert_eq!(h.presenter.last_address().as_deref(), Some("user@x.com"));
        assert_eq!(h.service.args("assign").len(), 1);
        assert_eq!(h.service.args("assign")[0][0], "S_USER");
        assert_eq!(h.presenter.count_notices(NoticeLevel::Error, "Failed to create"), 1);
        assert!(!h.controller.has_pending_retry().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_during_retry_keeps_session_cleared() {
        let h = harness();
        let _ = h.controller.gen_email().await;

        h.service.push_acquire(Ok(Session::new("S_RETRY", "r@x.com")));
        h.service.push_assign(Ok("retry@x.com".to_string()));
        h.service.delay_next("assign", Duration::from_secs(10));
        tokio::time::sleep(RETRY_DELAY + Duration::from_millis(100)).await;
        assert_eq!(h.service.calls("assign"), 1);

        h.controller.reset_session().await;
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(h.controller.state().await, SessionState::NoSession);
        assert!(h.controller.current_email().await.is_empty());
        assert_eq!(stored(&h, "tempmail_session"), None);
        assert_eq!(stored(&h, "tempmail_email"), None);
        assert_eq!(h.service.calls("list"), 0);
        assert!(!h.controller.has_pending_retry().await);
    }

    #[tokio::test]
    async fn test_refresh_without_session_is_noop() {
        let h = harness();

        let err = h.controller.refresh_mail().await.unwrap_err();

        assert!(matches!(
            err,
            Error::PreconditionFailed(Precondition::NoSession)
        ));
        assert_eq!(h.service.calls("list"), 0);
        assert!(h.presenter.has_notice(NoticeLevel::Error, "No active email session"));
    }

    #[tokio::test]
    async fn test_refresh_without_address_is_noop() {
        let h = harness();
        h.controller.lock_state().await.session_id = "S1".to_string();
        assert_eq!(
            h.controller.state().await,
            SessionState::HasSessionNoAddress
        );

        let err = h.controller.refresh_mail().await.unwrap_err();

        assert!(matches!(
            err,
            Error::PreconditionFailed(Precondition::NoAddress)
        ));
        assert_eq!(h.service.calls("list"), 0);
    }

    #[tokio::test]
    async fn test_empty_assigned_address_is_failure() {
        let h = harness();
        h.service.push_acquire(Ok(Session::new("S1", "a@x.com")));
        h.service.push_assign(Ok(String::new()));

        let err = h.controller.gen_email().await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(h.controller.current_email().await.is_empty());
        h.controller.cancel_retry().await;
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let h = active_harness().await;
        h.service
            .push_list(Ok(vec![summary("1", "one"), summary("2", "two")]));
        h.service.push_list(Ok(vec![summary("3", "three")]));

        h.controller.refresh_mail().await.unwrap();
        assert_eq!(h.controller.messages().await.len(), 2);

        let latest = h.controller.refresh_mail().await.unwrap();
        assert_eq!(latest, vec![summary("3", "three")]);
        assert_eq!(h.controller.messages().await, vec![summary("3", "three")]);

        let args = h.service.args("list");
        assert!(args.iter().all(|a| a[0] == "S1" && a[1] == "0"));
    }

    #[tokio::test]
    async fn test_refresh_auth_expired_clears_session() {
        let h = active_harness().await;
        let calls_before = h.service.calls("list");
        h.service.push_list(Err(ServiceError::Status(401)));

        let err = h.controller.refresh_mail().await.unwrap_err();
        assert!(err.is_auth_expired());
        assert_eq!(h.controller.state().await, SessionState::NoSession);
        assert_eq!(stored(&h, "tempmail_session"), None);
        assert_eq!(stored(&h, "tempmail_email"), None);
        assert!(!h.controller.has_pending_retry().await);

        // Next refresh is a precondition failure without a network call
        let err = h.controller.refresh_mail().await.unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
        assert_eq!(h.service.calls("list"), calls_before + 1);
    }

    /// Starts a refresh of the current session whose answer arrives after 10s.
    fn slow_refresh(
        h: &Harness,
        answer: std::result::Result<Vec<MessageSummary>, ServiceError>,
    ) -> JoinHandle<Result<Vec<MessageSummary>>> {
        h.service.push_list(answer);
        h.service.delay_next("list", Duration::from_secs(10));
        let controller = h.controller.clone();
        tokio::spawn(async move { controller.refresh_mail().await })
    }

    /// Replaces the current session with `S_NEW` / `new@x.com`.
    async fn replace_session(h: &Harness) {
        h.controller.reset_session().await;
        h.service.push_acquire(Ok(Session::new("S_NEW", "n@x.com")));
        h.service.push_assign(Ok("new@x.com".to_string()));
        h.controller.gen_email().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_expiry_keeps_new_session() {
        let h = active_harness().await;
        let stale = slow_refresh(&h, Err(ServiceError::Status(401)));
        tokio::time::sleep(Duration::from_secs(1)).await;

        replace_session(&h).await;
        let err = stale.await.unwrap().unwrap_err();

        assert!(err.is_auth_expired());
        assert_eq!(h.controller.session_id().await, "S_NEW");
        assert_eq!(h.controller.current_email().await, "new@x.com");
        assert_eq!(stored(&h, "tempmail_session").as_deref(), Some("S_NEW"));
        assert_eq!(stored(&h, "tempmail_email").as_deref(), Some("new@x.com"));
        assert_eq!(h.presenter.last_address().as_deref(), Some("new@x.com"));
        assert!(!h.presenter.has_notice(NoticeLevel::Error, "Session expired"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_inbox_not_applied() {
        let h = active_harness().await;
        let stale = slow_refresh(&h, Ok(vec![summary("1", "old inbox")]));
        tokio::time::sleep(Duration::from_secs(1)).await;

        replace_session(&h).await;
        stale.await.unwrap().unwrap();

        assert!(h.controller.messages().await.is_empty());
        assert_eq!(h.controller.session_id().await, "S_NEW");
    }

    #[tokio::test]
    async fn test_refresh_transient_error_keeps_snapshot() {
        let h = active_harness().await;
        h.service.push_list(Ok(vec![summary("1", "kept")]));
        h.controller.refresh_mail().await.unwrap();

        h.service.push_list(Err(ServiceError::Status(500)));
        let err = h.controller.refresh_mail().await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(h.controller.messages().await, vec![summary("1", "kept")]);
        assert_eq!(h.controller.session_id().await, "S1");
        assert!(h.presenter.has_notice(NoticeLevel::Error, "Failed to fetch emails"));
    }

    #[tokio::test]
    async fn test_init_resumes_persisted_session() {
        let h = harness_with(&[
            ("tempmail_session", "S1"),
            ("tempmail_email", "a@x.com"),
        ]);
        h.service.push_list(Ok(vec![summary("1", "hello")]));

        h.controller.init().await.unwrap();

        assert_eq!(h.service.calls("acquire"), 0);
        assert_eq!(h.service.calls("assign"), 0);
        assert_eq!(h.service.calls("list"), 1);
        assert_eq!(h.presenter.last_address().as_deref(), Some("a@x.com"));
        assert_eq!(h.controller.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_init_without_session_generates() {
        let h = harness_with(&[("tempmail_email", "orphan@x.com")]);
        h.service.push_acquire(Ok(Session::new("S1", "a@x.com")));
        h.service.push_assign(Ok("b@x.com".to_string()));

        h.controller.init().await.unwrap();

        assert_eq!(h.service.calls("acquire"), 1);
        assert_eq!(h.controller.current_email().await, "b@x.com");
    }

    #[tokio::test]
    async fn test_view_requires_session() {
        let h = harness();
        let err = h.controller.view_email("1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::PreconditionFailed(Precondition::NoSession)
        ));
        assert_eq!(h.service.calls("fetch"), 0);
    }

    #[tokio::test]
    async fn test_view_shows_message() {
        let h = active_harness().await;
        let detail = MessageDetail {
            id: "1".to_string(),
            from: "sender@example.com".to_string(),
            subject: "Hello".to_string(),
            timestamp_secs: 1_700_000_000,
            body_html: "<p>Hi</p>".to_string(),
            attachments: vec![Attachment {
                name: "a.txt".to_string(),
            }],
        };
        h.service.push_fetch(Ok(detail.clone()));

        let shown = h.controller.view_email("1").await.unwrap();

        assert_eq!(shown, detail);
        assert_eq!(h.presenter.opened.lock().unwrap().as_slice(), &[detail]);
    }

    #[tokio::test]
    async fn test_view_auth_expired_clears_session() {
        let h = active_harness().await;
        h.service.push_fetch(Err(ServiceError::Status(401)));

        let err = h.controller.view_email("1").await.unwrap_err();

        assert!(err.is_auth_expired());
        assert!(h.controller.session_id().await.is_empty());
        assert_eq!(stored(&h, "tempmail_session"), None);
    }

    #[tokio::test]
    async fn test_delete_confirmed_refreshes_once() {
        let h = active_harness().await;
        let lists_before = h.service.calls("list");

        assert!(h.controller.delete_email("7").await.unwrap());

        assert_eq!(h.service.args("delete"), vec![vec!["S1".to_string(), "7".to_string()]]);
        assert_eq!(h.service.calls("list"), lists_before + 1);
        assert!(h.presenter.has_notice(NoticeLevel::Success, "Email deleted"));
    }

    #[tokio::test]
    async fn test_delete_failure_still_refreshes_once() {
        let h = active_harness().await;
        let lists_before = h.service.calls("list");
        h.service.push_delete(Err(ServiceError::Status(500)));

        let err = h.controller.delete_email("7").await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(h.service.calls("list"), lists_before + 1);
        assert!(h.presenter.has_notice(NoticeLevel::Error, "Failed to delete"));
    }

    #[tokio::test]
    async fn test_delete_declined_does_nothing() {
        let h = active_harness().await;
        let lists_before = h.service.calls("list");
        h.presenter.confirm_answer.store(false, Ordering::SeqCst);

        assert!(!h.controller.delete_email("7").await.unwrap());

        assert_eq!(h.service.calls("delete"), 0);
        assert_eq!(h.service.calls("list"), lists_before);
    }

    #[tokio::test]
    async fn test_delete_requires_session() {
        let h = harness();
        let err = h.controller.delete_email("7").await.unwrap_err();
        assert!(matches!(err, Error::PreconditionFailed(_)));
        assert_eq!(h.service.calls("delete"), 0);
    }

    #[tokio::test]
    async fn test_download_saves_attachment() {
        let h = active_harness().await;

        h.controller
            .download_attachment("7", "report.pdf")
            .await
            .unwrap();

        let saved = h.presenter.saved.lock().unwrap().clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "report.pdf");
        assert_eq!(saved[0].1.as_ref(), b"PDF-DATA");
        assert!(h.presenter.has_notice(NoticeLevel::Info, "Downloading"));
        assert!(h.presenter.has_notice(NoticeLevel::Success, "Attachment downloaded"));
    }

    #[tokio::test]
    async fn test_copy_email() {
        let h = harness();
        let err = h.controller.copy_email().await.unwrap_err();
        assert!(matches!(
            err,
            Error::PreconditionFailed(Precondition::NoAddress)
        ));

        let h = active_harness().await;
        h.controller.copy_email().await.unwrap();
        assert_eq!(
            h.presenter.copied.lock().unwrap().as_slice(),
            &["a@x.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reset_session() {
        let h = active_harness().await;
        h.service.push_list(Ok(vec![summary("1", "one")]));
        h.controller.refresh_mail().await.unwrap();

        h.controller.reset_session().await;

        assert_eq!(h.controller.state().await, SessionState::NoSession);
        assert!(h.controller.messages().await.is_empty());
        assert_eq!(stored(&h, "tempmail_session"), None);
        assert_eq!(h.presenter.last_address().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_search_filters_snapshot() {
        let h = active_harness().await;
        h.service.push_list(Ok(vec![
            summary("1", "Your invoice"),
            summary("2", "Welcome aboard"),
        ]));
        h.controller.refresh_mail().await.unwrap();

        let hits = h.controller.search("INVOICE").await;
        assert_eq!(hits, vec![summary("1", "Your invoice")]);
        assert_eq!(h.controller.search("  ").await.len(), 2);
        assert!(h.controller.search("nothing").await.is_empty());
    }

    #[tokio::test]
    async fn test_localized_notices() {
        let mut config = test_config();
        config.locale = crate::i18n::Locale::Russian;
        let service = Arc::new(FakeService::default());
        let presenter = Arc::new(RecordingPresenter::default());
        let store = SessionStore::new(Arc::new(MemoryStore::new()), config.keys.clone(), 30);
        let controller = MailboxController::new(config, service, store, presenter.clone());

        let _ = controller.refresh_mail().await;

        assert!(presenter.has_notice(NoticeLevel::Error, "Нет активной сессии электронной почты"));
    }

    #[test]
    fn test_random_local_part() {
        let a = random_local_part();
        assert_eq!(a.len(), LOCAL_PART_LEN);
        assert!(a.bytes().all(|b| LOCAL_PART_CHARSET.contains(&b)));
    }
}

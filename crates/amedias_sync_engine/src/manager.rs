//! Remote sync state machine.

use crate::backend::RemoteBackend;
use crate::config::SyncConfig;
use crate::credentials::ShareCredentials;
use crate::error::{SyncError, SyncResult};
use crate::schedule::{PeriodicTask, ScheduledTask};
use amedias_codec::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

/// Observable sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No sync activity.
    Idle,
    /// Fetching remote state.
    Loading,
    /// A push is queued or in flight.
    Saving,
    /// Local and remote agree as of the last operation.
    Synced,
    /// The last operation failed.
    Error,
}

impl SyncStatus {
    /// Returns true while an operation is pending.
    pub fn is_busy(&self) -> bool {
        matches!(self, SyncStatus::Loading | SyncStatus::Saving)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Loading => "loading",
            SyncStatus::Saving => "saving",
            SyncStatus::Synced => "synced",
            SyncStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Whether a remote state is currently being handed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Normal operation; pushes are allowed.
    Ready,
    /// A fetched state is being applied; pushes are refused.
    ApplyingRemote,
}

/// What a fetch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote state differed and was handed to the application.
    Applied,
    /// The remote state matched the last known fingerprint.
    Unchanged,
    /// The session changed while the fetch was in flight, or another remote
    /// state was still being applied; result dropped.
    Discarded,
}

/// Receives states pulled from the remote backend.
#[async_trait]
pub trait RemoteStateHandler: Send + Sync {
    /// Applies a remote state locally.
    ///
    /// Pushes triggered from inside this call are refused.
    async fn on_remote_state(&self, state: Value);
}

/// Public view of the active session. Never includes the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSession {
    /// Share id.
    pub share_id: String,
    /// Fingerprint of the last state known to be on the remote.
    pub last_fingerprint: Option<Fingerprint>,
    /// When local and remote last agreed.
    pub last_synced_at: Option<DateTime<Utc>>,
}

enum RetryAction {
    Fetch,
    Save(Value),
}

struct Inner {
    credentials: Option<ShareCredentials>,
    last_fingerprint: Option<Fingerprint>,
    last_synced_at: Option<DateTime<Utc>>,
    fetch_retries: u32,
    save_retries: u32,
    phase: Phase,
    online: bool,
    pending_save: Option<Value>,
    /// A push that failed and still has retries left.
    failed_save: Option<Value>,
}

impl Inner {
    fn new() -> Self {
        Self {
            credentials: None,
            last_fingerprint: None,
            last_synced_at: None,
            fetch_retries: 0,
            save_retries: 0,
            phase: Phase::Ready,
            online: true,
            pending_save: None,
            failed_save: None,
        }
    }

    fn reset_session(&mut self) {
        self.last_fingerprint = None;
        self.last_synced_at = None;
        self.fetch_retries = 0;
        self.save_retries = 0;
        self.pending_save = None;
        self.failed_save = None;
    }

    /// Status once no request is in flight.
    fn settled_status(&self) -> SyncStatus {
        if self.failed_save.is_some() {
            SyncStatus::Error
        } else if self.pending_save.is_some() {
            SyncStatus::Saving
        } else {
            SyncStatus::Synced
        }
    }

    fn is_session(&self, credentials: &ShareCredentials) -> bool {
        self.credentials.as_ref() == Some(credentials)
    }
}

/// Keeps one remote share in step with the local state.
///
/// - pushes are debounced: rapid edits collapse into one push of the latest
/// - a fixed-interval poll pulls remote changes while sharing
/// - transport failures back off exponentially up to a retry ceiling; fetches
///   and pushes keep separate retry timers, so a failing poll never drops a
///   push that is waiting to be retried
/// - a pulled state is never pushed straight back (echo prevention)
///
/// The manager is shared through an [`Arc`]; its timers hold only weak
/// references, so dropping the last `Arc` stops everything.
pub struct RemoteSyncManager {
    backend: Arc<dyn RemoteBackend>,
    config: SyncConfig,
    inner: Mutex<Inner>,
    status: watch::Sender<SyncStatus>,
    handler: RwLock<Option<Arc<dyn RemoteStateHandler>>>,
    debounce: ScheduledTask,
    fetch_retry: ScheduledTask,
    save_retry: ScheduledTask,
    poller: PeriodicTask,
    this: Weak<RemoteSyncManager>,
}

/// Puts the manager in [`Phase::ApplyingRemote`] until dropped.
struct ApplyingRemote<'a> {
    manager: &'a RemoteSyncManager,
}

impl<'a> ApplyingRemote<'a> {
    fn enter(manager: &'a RemoteSyncManager) -> Option<Self> {
        let mut inner = manager.inner.lock();
        if inner.phase == Phase::ApplyingRemote {
            return None;
        }
        inner.phase = Phase::ApplyingRemote;
        Some(Self { manager })
    }
}

impl Drop for ApplyingRemote<'_> {
    fn drop(&mut self) {
        self.manager.inner.lock().phase = Phase::Ready;
    }
}

impl RemoteSyncManager {
    /// Creates a manager with no active session.
    pub fn new(backend: Arc<dyn RemoteBackend>, config: SyncConfig) -> Arc<Self> {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Arc::new_cyclic(|this| Self {
            backend,
            config,
            inner: Mutex::new(Inner::new()),
            status,
            handler: RwLock::new(None),
            debounce: ScheduledTask::new(),
            fetch_retry: ScheduledTask::new(),
            save_retry: ScheduledTask::new(),
            poller: PeriodicTask::new(),
            this: this.clone(),
        })
    }

    /// Sets the receiver of pulled states.
    pub fn set_handler(&self, handler: Arc<dyn RemoteStateHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Returns the sync configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// Returns true if a session is active.
    pub fn is_sharing(&self) -> bool {
        self.inner.lock().credentials.is_some()
    }

    /// Returns true unless the device was marked offline.
    pub fn is_online(&self) -> bool {
        self.inner.lock().online
    }

    /// Snapshot of the active session.
    pub fn session(&self) -> Option<SyncSession> {
        let inner = self.inner.lock();
        inner.credentials.as_ref().map(|creds| SyncSession {
            share_id: creds.share_id().to_string(),
            last_fingerprint: inner.last_fingerprint.clone(),
            last_synced_at: inner.last_synced_at,
        })
    }

    /// When local and remote last agreed.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_synced_at
    }

    /// Returns true if polling is running.
    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// Returns true if a debounced push is waiting.
    pub fn has_pending_save(&self) -> bool {
        self.inner.lock().pending_save.is_some()
    }

    /// Returns true if a failed push is waiting to be retried.
    pub fn has_failed_save(&self) -> bool {
        self.inner.lock().failed_save.is_some()
    }

    /// Builds the link that lets another device join the session.
    ///
    /// `base` keeps its other query parameters; the fragment is dropped.
    pub fn share_link(&self, base: &Url) -> Option<String> {
        let inner = self.inner.lock();
        let creds = inner.credentials.as_ref()?;

        let mut url = base.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| name != "share" && name != "key")
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("share", creds.share_id())
            .append_pair("key", creds.secret());
        url.set_fragment(None);
        Some(url.into())
    }

    fn set_status(&self, next: SyncStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(status = %next, "sync status changed");
        }
    }

    fn credentials(&self) -> SyncResult<ShareCredentials> {
        self.inner
            .lock()
            .credentials
            .clone()
            .ok_or(SyncError::NotSharing)
    }

    /// Creates a remote share holding `state` and starts polling it.
    ///
    /// Returns the new credentials; this is the only call that exposes the
    /// secret.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadySharing`] if a session is active (no-op)
    /// - [`SyncError::Offline`] if the device is offline
    /// - the backend's error if creation fails
    pub async fn create_share(&self, state: &Value) -> SyncResult<ShareCredentials> {
        {
            let inner = self.inner.lock();
            if inner.credentials.is_some() {
                return Err(SyncError::AlreadySharing);
            }
            if !inner.online {
                return Err(SyncError::Offline);
            }
        }

        self.set_status(SyncStatus::Loading);
        let credentials = ShareCredentials::generate();

        let record = match self.backend.create(&credentials, state).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "creating remote share failed");
                self.set_status(SyncStatus::Error);
                return Err(e);
            }
        };

        {
            let mut inner = self.inner.lock();
            inner.credentials = Some(credentials.clone());
            inner.last_fingerprint = Some(Fingerprint::of(state));
            inner.last_synced_at = Some(record.updated_at);
            inner.fetch_retries = 0;
            inner.save_retries = 0;
        }
        self.set_status(SyncStatus::Synced);
        self.start_polling();

        info!(share_id = credentials.share_id(), "remote share created");
        Ok(credentials)
    }

    /// Joins an existing share, pulls its state and starts polling.
    ///
    /// A failed first pull keeps the session: the status becomes
    /// [`SyncStatus::Error`], retries are scheduled and polling continues.
    ///
    /// # Errors
    ///
    /// The first pull's error, if any.
    pub async fn init_from_share_parameters(
        &self,
        credentials: ShareCredentials,
    ) -> SyncResult<FetchOutcome> {
        self.stop_timers();
        {
            let mut inner = self.inner.lock();
            inner.credentials = Some(credentials.clone());
            inner.reset_session();
        }
        info!(share_id = credentials.share_id(), "joining remote share");

        let outcome = self.fetch_remote_state(false).await;
        self.start_polling();
        outcome
    }

    /// Pulls the remote state.
    ///
    /// A state whose fingerprint equals the last known one only advances
    /// [`RemoteSyncManager::last_synced_at`]; the handler is not called.
    /// `silent` fetches leave the status alone until they finish.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotSharing`] without a session
    /// - [`SyncError::Offline`] while offline (no retry scheduled)
    /// - transport errors, after scheduling a retry when allowed
    pub async fn fetch_remote_state(&self, silent: bool) -> SyncResult<FetchOutcome> {
        let credentials = self.credentials()?;
        if !self.is_online() {
            debug!("offline, skipping fetch");
            return Err(SyncError::Offline);
        }

        if !silent {
            self.set_status(SyncStatus::Loading);
        }

        let fetched = match self.backend.fetch(&credentials).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(SyncError::NotFound),
            Err(e) => Err(e),
        };

        let record = match fetched {
            Ok(record) => record,
            Err(e) => {
                if self.inner.lock().is_session(&credentials) {
                    error!(
                        share_id = credentials.share_id(),
                        error = %e,
                        "fetching remote state failed"
                    );
                    self.schedule_retry(&e, RetryAction::Fetch);
                }
                return Err(e);
            }
        };

        let incoming = Fingerprint::of(&record.payload);
        let changed = {
            let mut inner = self.inner.lock();
            if !inner.is_session(&credentials) {
                debug!("session changed during fetch, dropping result");
                return Ok(FetchOutcome::Discarded);
            }
            inner.last_synced_at = Some(record.updated_at);
            inner.last_fingerprint.as_ref() != Some(&incoming)
        };

        let outcome = if changed {
            self.apply_remote(&credentials, incoming, record.payload).await
        } else {
            FetchOutcome::Unchanged
        };

        self.fetch_retry.cancel();
        let settled = {
            let mut inner = self.inner.lock();
            inner.fetch_retries = 0;
            inner.settled_status()
        };
        self.set_status(settled);
        Ok(outcome)
    }

    /// Hands a pulled state to the handler. The fingerprint is recorded only
    /// once the state is actually being applied.
    async fn apply_remote(
        &self,
        credentials: &ShareCredentials,
        incoming: Fingerprint,
        state: Value,
    ) -> FetchOutcome {
        let Some(_guard) = ApplyingRemote::enter(self) else {
            warn!("remote state already being applied, skipping");
            return FetchOutcome::Discarded;
        };
        {
            let mut inner = self.inner.lock();
            if !inner.is_session(credentials) {
                return FetchOutcome::Discarded;
            }
            inner.last_fingerprint = Some(incoming);
        }

        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            debug!("applying remote state");
            handler.on_remote_state(state).await;
        }
        FetchOutcome::Applied
    }

    /// Queues a debounced push of `state`.
    ///
    /// Restarts the quiet period; when it ends, only the latest queued state
    /// is pushed. Returns false, pushing nothing, without a session or while
    /// a remote state is being applied.
    pub fn queue_save(&self, state: Value) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.phase == Phase::ApplyingRemote {
                debug!("skipping push of a state being applied from remote");
                return false;
            }
            if inner.credentials.is_none() {
                return false;
            }
            if inner.failed_save.take().is_some() {
                debug!("newer edit replaces the failed push");
            }
        }
        self.save_retry.cancel();
        self.schedule_push(state);
        true
    }

    fn schedule_push(&self, state: Value) {
        self.inner.lock().pending_save = Some(state);
        self.set_status(SyncStatus::Saving);
        let this = self.this.clone();
        self.debounce.schedule(self.config.debounce, async move {
            if let Some(manager) = this.upgrade() {
                let _ = manager.push_pending().await;
            }
        });
    }

    async fn push_pending(&self) -> SyncResult<()> {
        let pending = {
            let mut inner = self.inner.lock();
            match inner.pending_save.take() {
                Some(state) => Some(state),
                None => inner.failed_save.take(),
            }
        };
        match pending {
            Some(state) => self.save_remote_state(state).await,
            None => Ok(()),
        }
    }

    /// Pushes `state` now.
    ///
    /// Offline pushes are kept and sent when the device comes back online.
    ///
    /// # Errors
    ///
    /// - [`SyncError::ApplyingRemote`] while a remote state is being applied
    /// - [`SyncError::NotSharing`] without a session
    /// - [`SyncError::Offline`] while offline
    /// - transport errors, after scheduling a retry when allowed
    pub async fn save_remote_state(&self, state: Value) -> SyncResult<()> {
        let credentials = {
            let mut inner = self.inner.lock();
            if inner.phase == Phase::ApplyingRemote {
                return Err(SyncError::ApplyingRemote);
            }
            let Some(credentials) = inner.credentials.clone() else {
                return Err(SyncError::NotSharing);
            };
            if !inner.online {
                if inner.pending_save.is_none() {
                    inner.pending_save = Some(state);
                }
                debug!("offline, push kept for later");
                return Err(SyncError::Offline);
            }
            credentials
        };

        self.set_status(SyncStatus::Saving);
        match self.backend.update(&credentials, &state).await {
            Ok(record) => {
                let still_pending = {
                    let mut inner = self.inner.lock();
                    if !inner.is_session(&credentials) {
                        return Ok(());
                    }
                    inner.last_fingerprint = Some(Fingerprint::of(&state));
                    inner.last_synced_at = Some(record.updated_at);
                    inner.save_retries = 0;
                    inner.failed_save = None;
                    inner.pending_save.is_some()
                };
                self.save_retry.cancel();
                if !still_pending {
                    self.set_status(SyncStatus::Synced);
                }
                debug!(share_id = credentials.share_id(), "remote state saved");
                Ok(())
            }
            Err(e) => {
                if self.inner.lock().is_session(&credentials) {
                    error!(
                        share_id = credentials.share_id(),
                        error = %e,
                        "saving remote state failed"
                    );
                    self.schedule_retry(&e, RetryAction::Save(state));
                }
                Err(e)
            }
        }
    }

    fn schedule_retry(&self, err: &SyncError, action: RetryAction) {
        self.set_status(SyncStatus::Error);
        let is_fetch = matches!(action, RetryAction::Fetch);
        let task = if is_fetch {
            &self.fetch_retry
        } else {
            &self.save_retry
        };

        if !err.is_retryable() {
            warn!(error = %err, "error is not retryable");
            return;
        }

        let policy = &self.config.retry;
        let delay = {
            let mut inner = self.inner.lock();
            let attempt = if is_fetch {
                inner.fetch_retries
            } else {
                inner.save_retries
            };
            let next = (attempt < policy.max_retries).then_some(attempt + 1);
            match action {
                RetryAction::Fetch => inner.fetch_retries = next.unwrap_or(0),
                RetryAction::Save(state) => {
                    inner.save_retries = next.unwrap_or(0);
                    inner.failed_save = next.map(|_| state);
                }
            }
            match next {
                Some(next) => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        attempt = next,
                        delay_ms = delay.as_millis() as u64,
                        fetch = is_fetch,
                        "retry scheduled"
                    );
                    Some(delay)
                }
                None => {
                    warn!(
                        retries = attempt,
                        fetch = is_fetch,
                        "giving up until the next trigger"
                    );
                    None
                }
            }
        };

        let Some(delay) = delay else {
            task.cancel();
            return;
        };

        let this = self.this.clone();
        task.schedule(delay, async move {
            let Some(manager) = this.upgrade() else {
                return;
            };
            if !is_fetch {
                manager.retry_failed_save();
            } else if manager.status() == SyncStatus::Error {
                let _ = manager.fetch_remote_state(true).await;
            }
        });
    }

    fn retry_failed_save(&self) {
        let state = {
            let mut inner = self.inner.lock();
            let Some(state) = inner.failed_save.take() else {
                return;
            };
            if inner.pending_save.is_some() {
                debug!("newer edit pending, dropping retried state");
                return;
            }
            if inner.credentials.is_none() {
                return;
            }
            state
        };
        self.schedule_push(state);
    }

    /// Sends a pending debounced push, or a failed push awaiting its retry,
    /// immediately.
    ///
    /// # Errors
    ///
    /// The push's error, if one was pending and failed.
    pub async fn flush(&self) -> SyncResult<()> {
        self.debounce.cancel();
        self.save_retry.cancel();
        self.push_pending().await
    }

    /// Starts polling the remote state. Does nothing without a session.
    pub fn start_polling(&self) {
        self.poller.stop();
        if !self.is_sharing() {
            return;
        }

        let this = self.this.clone();
        self.poller.start(self.config.poll_interval, move || {
            let this = this.clone();
            async move {
                if let Some(manager) = this.upgrade() {
                    let _ = manager.fetch_remote_state(true).await;
                }
            }
        });
        debug!(interval_ms = self.config.poll_interval.as_millis() as u64, "polling started");
    }

    /// Stops polling.
    pub fn stop_polling(&self) {
        if self.poller.stop() {
            debug!("polling stopped");
        }
    }

    fn stop_timers(&self) {
        self.stop_polling();
        self.debounce.cancel();
        self.fetch_retry.cancel();
        self.save_retry.cancel();
    }

    /// Ends the session: stops polling, cancels every timer and forgets the
    /// credentials. Returns whether a session was active.
    pub fn leave_share(&self) -> bool {
        self.stop_timers();
        let was_sharing = {
            let mut inner = self.inner.lock();
            let was_sharing = inner.credentials.take().is_some();
            inner.reset_session();
            was_sharing
        };
        self.set_status(SyncStatus::Idle);
        if was_sharing {
            info!("left remote share");
        }
        was_sharing
    }

    /// Records connectivity.
    ///
    /// Going offline makes fetches and pushes skip the network. Coming back
    /// online sends any kept push, then pulls.
    pub async fn set_online(&self, online: bool) {
        let came_back = {
            let mut inner = self.inner.lock();
            let came_back = online && !inner.online;
            inner.online = online;
            came_back
        };

        if !came_back || !self.is_sharing() {
            return;
        }

        info!("back online, resyncing");
        self.fetch_retry.cancel();
        {
            let mut inner = self.inner.lock();
            inner.fetch_retries = 0;
            inner.save_retries = 0;
        }
        if let Err(e) = self.flush().await {
            warn!(error = %e, "pushing kept changes failed");
            return;
        }
        let _ = self.fetch_remote_state(true).await;
    }

    /// Sends any pending push and stops all timers. The session is kept.
    pub async fn shutdown(&self) {
        if let Err(e) = self.flush().await {
            warn!(error = %e, "final push failed");
        }
        self.stop_timers();
        debug!("sync manager shut down");
    }
}

impl std::fmt::Debug for RemoteSyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSyncManager")
            .field("status", &self.status())
            .field("session", &self.session())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl RemoteStateHandler for Recorder {
        async fn on_remote_state(&self, state: Value) {
            self.states.lock().push(state);
        }
    }

    fn setup() -> (Arc<MemoryBackend>, Arc<RemoteSyncManager>, Arc<Recorder>) {
        let backend = Arc::new(MemoryBackend::new());
        let manager = RemoteSyncManager::new(backend.clone(), SyncConfig::default());
        let recorder = Arc::new(Recorder::default());
        manager.set_handler(recorder.clone());
        (backend, manager, recorder)
    }

    #[test]
    fn status_display() {
        assert_eq!(SyncStatus::Synced.to_string(), "synced");
        assert!(SyncStatus::Saving.is_busy());
        assert!(!SyncStatus::Error.is_busy());
        assert_eq!(serde_json::to_value(SyncStatus::Idle).unwrap(), "idle");
    }

    #[tokio::test(start_paused = true)]
    async fn create_share_goes_synced_and_polls() {
        let (backend, manager, _) = setup();
        let creds = manager.create_share(&json!({"a": 1})).await.unwrap();

        assert_eq!(manager.status(), SyncStatus::Synced);
        assert!(manager.is_polling());
        assert_eq!(backend.payload_of(creds.share_id()), Some(json!({"a": 1})));

        let session = manager.session().unwrap();
        assert_eq!(session.share_id, creds.share_id());
        assert_eq!(session.last_fingerprint, Some(Fingerprint::of(&json!({"a": 1}))));
        assert!(session.last_synced_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn create_share_refused_while_sharing() {
        let (backend, manager, _) = setup();
        manager.create_share(&json!(1)).await.unwrap();

        let second = manager.create_share(&json!(2)).await;
        assert_eq!(second, Err(SyncError::AlreadySharing));
        assert_eq!(backend.create_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn create_share_failure_sets_error() {
        let (backend, manager, _) = setup();
        backend.fail_next(1);
        assert!(manager.create_share(&json!(1)).await.is_err());
        assert_eq!(manager.status(), SyncStatus::Error);
        assert!(!manager.is_sharing());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_with_equal_fingerprint_skips_callback() {
        let (backend, manager, recorder) = setup();
        let creds = manager.create_share(&json!({"a": 1})).await.unwrap();
        manager.stop_polling();

        let later = "2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        backend.touch(&creds, later);

        let outcome = manager.fetch_remote_state(false).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Unchanged);
        assert!(recorder.states.lock().is_empty());
        assert_eq!(manager.last_synced_at(), Some(later));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_with_new_state_calls_handler() {
        let (backend, manager, recorder) = setup();
        let creds = manager.create_share(&json!({"a": 1})).await.unwrap();
        manager.stop_polling();

        backend.remote_write(&creds, json!({"a": 2}));
        let outcome = manager.fetch_remote_state(false).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Applied);
        assert_eq!(*recorder.states.lock(), vec![json!({"a": 2})]);
        assert_eq!(manager.status(), SyncStatus::Synced);
        assert_eq!(manager.phase(), Phase::Ready);
    }

    /// Fetches again from inside the handler after another device wrote.
    struct Refetching {
        manager: Mutex<Weak<RemoteSyncManager>>,
        backend: Arc<MemoryBackend>,
        credentials: Mutex<Option<ShareCredentials>>,
        states: Mutex<Vec<Value>>,
        nested: Mutex<Vec<SyncResult<FetchOutcome>>>,
    }

    #[async_trait]
    impl RemoteStateHandler for Refetching {
        async fn on_remote_state(&self, state: Value) {
            self.states.lock().push(state);
            if self.states.lock().len() > 1 {
                return;
            }
            let manager = self.manager.lock().upgrade();
            let credentials = self.credentials.lock().clone();
            if let (Some(manager), Some(credentials)) = (manager, credentials) {
                self.backend.remote_write(&credentials, json!({"v": 3}));
                let outcome = manager.fetch_remote_state(true).await;
                self.nested.lock().push(outcome);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn state_skipped_during_apply_is_applied_later() {
        let backend = Arc::new(MemoryBackend::new());
        let manager = RemoteSyncManager::new(backend.clone(), SyncConfig::default());
        let handler = Arc::new(Refetching {
            manager: Mutex::new(Arc::downgrade(&manager)),
            backend: backend.clone(),
            credentials: Mutex::new(None),
            states: Mutex::new(Vec::new()),
            nested: Mutex::new(Vec::new()),
        });
        manager.set_handler(handler.clone());

        let creds = manager.create_share(&json!({"v": 1})).await.unwrap();
        manager.stop_polling();
        *handler.credentials.lock() = Some(creds.clone());
        backend.remote_write(&creds, json!({"v": 2}));

        let outcome = manager.fetch_remote_state(false).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Applied);
        assert_eq!(*handler.nested.lock(), vec![Ok(FetchOutcome::Discarded)]);
        assert_eq!(
            manager.session().unwrap().last_fingerprint,
            Some(Fingerprint::of(&json!({"v": 2})))
        );

        let outcome = manager.fetch_remote_state(false).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Applied);
        assert_eq!(
            *handler.states.lock(),
            vec![json!({"v": 2}), json!({"v": 3})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_without_session_is_not_sharing() {
        let (_, manager, _) = setup();
        assert_eq!(
            manager.fetch_remote_state(false).await,
            Err(SyncError::NotSharing)
        );
        assert_eq!(manager.status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_save_without_session_is_ignored() {
        let (backend, manager, _) = setup();
        assert!(!manager.queue_save(json!(1)));
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.update_count(), 0);
        assert_eq!(manager.status(), SyncStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn save_updates_fingerprint() {
        let (backend, manager, _) = setup();
        manager.create_share(&json!(1)).await.unwrap();

        manager.save_remote_state(json!(2)).await.unwrap();
        assert_eq!(backend.update_count(), 1);
        assert_eq!(
            manager.session().unwrap().last_fingerprint,
            Some(Fingerprint::of(&json!(2)))
        );
        assert_eq!(manager.status(), SyncStatus::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_share_clears_everything() {
        let (backend, manager, _) = setup();
        manager.create_share(&json!(1)).await.unwrap();
        manager.queue_save(json!(2));

        assert!(manager.leave_share());
        assert!(!manager.is_sharing());
        assert!(!manager.is_polling());
        assert!(manager.session().is_none());
        assert_eq!(manager.status(), SyncStatus::Idle);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.update_count(), 0);
        assert_eq!(backend.fetch_count(), 0);
        assert!(!manager.leave_share());
    }

    #[tokio::test(start_paused = true)]
    async fn share_link_carries_credentials() {
        let (_, manager, _) = setup();
        let base = Url::parse("https://amedias.app/?tab=split#x").unwrap();
        assert!(manager.share_link(&base).is_none());

        let creds = manager.create_share(&json!(1)).await.unwrap();
        let link = manager.share_link(&base).unwrap();
        assert_eq!(
            link,
            format!(
                "https://amedias.app/?tab=split&share={}&key={}",
                creds.share_id(),
                creds.secret()
            )
        );
    }

    #[tokio::test(start_paused = true)]
    async fn status_changes_are_published() {
        let (_, manager, _) = setup();
        let mut rx = manager.subscribe_status();
        manager.create_share(&json!(1)).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SyncStatus::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn session_debug_hides_secret() {
        let (_, manager, _) = setup();
        let creds = manager.create_share(&json!(1)).await.unwrap();
        let debug = format!("{:?}", manager);
        assert!(debug.contains(creds.share_id()));
        assert!(!debug.contains(creds.secret()));
    }
}

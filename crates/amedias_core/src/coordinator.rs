//! Sharing-mode selection and routing of local changes.

use crate::error::{CoreError, CoreResult};
use crate::model::{Backup, ShareMode, ShareSession, Startup, SyncInfo, SHARE_MODE_KEY, STATE_KEY};
use crate::observer::{RemoteApplier, StateObserver};
use amedias_codec::Fingerprint;
use amedias_share_url::{LegacyShare, ShareUrlError, ShareUrlManager};
use amedias_storage::LocalStore;
use amedias_sync_engine::{RemoteSyncManager, ShareCredentials, SyncStatus};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

/// The last link published in URL mode.
#[derive(Debug, Clone)]
struct PublishedLink {
    fingerprint: Fingerprint,
    at: DateTime<Utc>,
}

/// The single entry point the application talks to.
///
/// Picks the sharing mode at startup, always persists local changes, and
/// forwards them to whichever sharing mechanism is active:
///
/// | Mode | On local change |
/// |------|-----------------|
/// | [`ShareMode::None`] | persist only |
/// | [`ShareMode::Url`] | persist, then rewrite the link in the address |
/// | [`ShareMode::Remote`] | persist, then queue a debounced remote push |
///
/// In remote mode the status is the sync manager's; otherwise the
/// coordinator keeps its own.
pub struct HybridCoordinator {
    store: Arc<LocalStore>,
    links: Arc<ShareUrlManager>,
    remote: Option<Arc<RemoteSyncManager>>,
    observer: Arc<dyn StateObserver>,
    mode: RwLock<ShareMode>,
    status: watch::Sender<SyncStatus>,
    published: Mutex<Option<PublishedLink>>,
}

impl HybridCoordinator {
    /// Creates a coordinator. `remote` is `None` when no backend is configured.
    ///
    /// Pulled remote states are persisted locally before reaching `observer`.
    pub fn new(
        store: Arc<LocalStore>,
        links: Arc<ShareUrlManager>,
        remote: Option<Arc<RemoteSyncManager>>,
        observer: Arc<dyn StateObserver>,
    ) -> Self {
        if let Some(remote) = &remote {
            remote.set_handler(Arc::new(RemoteApplier::new(
                store.clone(),
                observer.clone(),
            )));
        }
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            store,
            links,
            remote,
            observer,
            mode: RwLock::new(ShareMode::None),
            status,
            published: Mutex::new(None),
        }
    }

    /// Current sharing mode.
    pub fn mode(&self) -> ShareMode {
        *self.mode.read()
    }

    /// Current sync status.
    pub fn status(&self) -> SyncStatus {
        match (self.mode(), &self.remote) {
            (ShareMode::Remote, Some(remote)) => remote.status(),
            _ => *self.status.borrow(),
        }
    }

    /// Subscribes to status changes of the mode active at call time.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        match (self.mode(), &self.remote) {
            (ShareMode::Remote, Some(remote)) => remote.subscribe_status(),
            _ => self.status.subscribe(),
        }
    }

    /// Returns true if a remote backend is configured.
    pub fn has_remote_config(&self) -> bool {
        self.remote.is_some()
    }

    /// The local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// The share link manager.
    pub fn links(&self) -> &Arc<ShareUrlManager> {
        &self.links
    }

    /// The remote sync manager, if a backend is configured.
    pub fn remote(&self) -> Option<&Arc<RemoteSyncManager>> {
        self.remote.as_ref()
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
            debug!(status = %next, "status changed");
        }
    }

    async fn set_mode(&self, mode: ShareMode) {
        *self.mode.write() = mode;
        if !self.store.save_as(SHARE_MODE_KEY, &mode).await {
            warn!(mode = %mode, "share mode not persisted");
        }
    }

    async fn save_local(&self, state: &Value) -> bool {
        let saved = self.store.save(STATE_KEY, state.clone()).await;
        if saved {
            debug!("local snapshot saved");
        }
        saved
    }

    async fn replay_local(&self) -> bool {
        match self.store.load(STATE_KEY, Value::Null).await {
            Value::Null => false,
            state => {
                debug!("replaying local snapshot");
                self.observer.on_state(state).await;
                true
            }
        }
    }

    /// Chooses the sharing mode from the current address and the store.
    ///
    /// In priority order:
    /// 1. an embedded state in the address is adopted (URL mode), saved
    ///    locally and replayed
    /// 2. remote share parameters join that share, when a backend is
    ///    configured
    /// 3. otherwise the local snapshot is replayed and the coordinator stays
    ///    local; a persisted share mode with nothing in the address to back
    ///    it is reset to [`ShareMode::None`]
    ///
    /// Never fails: an unreadable link falls back to the local snapshot with
    /// the status set to [`SyncStatus::Error`].
    pub async fn init(&self) -> Startup {
        let persisted = self
            .store
            .load_as::<ShareMode>(SHARE_MODE_KEY)
            .await
            .unwrap_or_default();
        *self.mode.write() = persisted;
        info!(mode = %persisted, "initializing sharing");

        if self.links.has_shared_data() {
            return self.adopt_link().await;
        }

        if let Some(legacy) = self.links.legacy_share() {
            if let Some(startup) = self.join_remote(legacy).await {
                return startup;
            }
        }

        if persisted.is_sharing() {
            warn!(mode = %persisted, "no share in the address, back to local only");
            self.set_mode(ShareMode::None).await;
        }
        let restored = self.replay_local().await;
        self.set_status(SyncStatus::Idle);
        Startup::Local { restored }
    }

    async fn adopt_link(&self) -> Startup {
        self.set_status(SyncStatus::Loading);

        match self.links.read_current() {
            Ok(shared) => {
                self.set_mode(ShareMode::Url).await;
                self.save_local(&shared.data).await;
                *self.published.lock() = Some(PublishedLink {
                    fingerprint: shared.fingerprint.clone(),
                    at: Utc::now(),
                });
                self.observer.on_state(shared.data).await;
                self.set_status(SyncStatus::Synced);
                info!(integrity = ?shared.integrity, "state loaded from share link");
                Startup::SharedLink {
                    integrity: shared.integrity,
                }
            }
            Err(e) => {
                error!(code = e.code(), error = %e, "share link unreadable, using local snapshot");
                if self.mode() != ShareMode::None {
                    self.set_mode(ShareMode::None).await;
                }
                let restored = self.replay_local().await;
                self.set_status(SyncStatus::Error);
                Startup::BrokenLink {
                    code: e.code(),
                    restored,
                }
            }
        }
    }

    async fn join_remote(&self, legacy: LegacyShare) -> Option<Startup> {
        let Some(remote) = &self.remote else {
            warn!("address names a remote share but no backend is configured");
            return None;
        };

        let LegacyShare {
            share_id,
            share_key,
        } = legacy;
        let credentials = ShareCredentials::new(share_id.clone(), share_key);

        self.set_mode(ShareMode::Remote).await;
        self.replay_local().await;

        let reached = match remote.init_from_share_parameters(credentials).await {
            Ok(outcome) => {
                debug!(?outcome, "joined remote share");
                true
            }
            Err(e) => {
                warn!(share_id = %share_id, error = %e, "remote share unreachable, will retry");
                false
            }
        };
        Some(Startup::RemoteShare { share_id, reached })
    }

    /// Handles a local edit.
    ///
    /// The state is always persisted locally first. In URL mode the link in
    /// the address is then rewritten; in remote mode a debounced push is
    /// queued. Pushes are skipped while a pulled state is being applied.
    ///
    /// # Errors
    ///
    /// In URL mode, the link error if the new state cannot be shared. The
    /// local snapshot is saved regardless.
    pub async fn on_local_change(&self, state: Value) -> CoreResult<()> {
        let saved = self.save_local(&state).await;

        match self.mode() {
            ShareMode::None => {
                self.set_status(if saved {
                    SyncStatus::Synced
                } else {
                    SyncStatus::Error
                });
                Ok(())
            }
            ShareMode::Url => self.update_share_url(&state).await.map(|_| ()),
            ShareMode::Remote => {
                if let Some(remote) = &self.remote {
                    if !remote.queue_save(state) {
                        debug!("remote push skipped");
                    }
                }
                Ok(())
            }
        }
    }

    /// Starts sharing `state` through a link and puts the link in the address.
    ///
    /// Returns the existing link if URL sharing is already active.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AlreadySharing`] while a remote share is active
    /// - [`ShareUrlError::TooLarge`] if the pre-flight estimate or the final
    ///   link exceeds the limit
    /// - [`ShareUrlError::EncodeFailed`] if the state cannot be encoded
    pub async fn start_url_share(&self, state: &Value) -> CoreResult<String> {
        match self.mode() {
            ShareMode::Url => {
                if let Some(link) = self.share_link() {
                    info!("share link already active");
                    return Ok(link);
                }
            }
            ShareMode::Remote => return Err(CoreError::AlreadySharing(ShareMode::Remote)),
            ShareMode::None => {}
        }

        self.set_status(SyncStatus::Loading);
        let created = match self.build_link(state) {
            Ok(created) => created,
            Err(e) => {
                self.set_status(SyncStatus::Error);
                return Err(e);
            }
        };

        self.publish_link(&created, state)?;
        self.set_mode(ShareMode::Url).await;
        self.set_status(SyncStatus::Synced);
        Ok(created)
    }

    fn build_link(&self, state: &Value) -> CoreResult<String> {
        let estimate = self.links.estimate_size(state)?;
        if !estimate.can_share {
            warn!(
                estimated = estimate.estimated_url_length,
                "state too large for a share link"
            );
            return Err(ShareUrlError::TooLarge {
                size: estimate.estimated_url_length,
                max_size: self.links.config().max_url_length,
            }
            .into());
        }
        Ok(self.links.create_share_url(state)?.url)
    }

    fn publish_link(&self, link: &str, state: &Value) -> CoreResult<()> {
        let url = Url::parse(link).map_err(|e| CoreError::InvalidAddress(e.to_string()))?;
        self.links.location().replace(url);
        *self.published.lock() = Some(PublishedLink {
            fingerprint: Fingerprint::of(state),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Rewrites the link in the address with `state`.
    ///
    /// Returns false, doing nothing, unless URL sharing is active.
    ///
    /// # Errors
    ///
    /// The link error if `state` cannot be shared; the previous link stays.
    pub async fn update_share_url(&self, state: &Value) -> CoreResult<bool> {
        if self.mode() != ShareMode::Url {
            return Ok(false);
        }

        self.set_status(SyncStatus::Saving);
        let created = match self.links.create_share_url(state) {
            Ok(created) => created,
            Err(e) => {
                error!(code = e.code(), "updating share link failed");
                self.set_status(SyncStatus::Error);
                return Err(e.into());
            }
        };

        self.publish_link(&created.url, state)?;
        self.set_status(SyncStatus::Synced);
        Ok(true)
    }

    /// Starts sharing `state` through the remote backend and puts the join
    /// link in the address.
    ///
    /// # Errors
    ///
    /// - [`CoreError::RemoteNotConfigured`] without a backend
    /// - [`CoreError::AlreadySharing`] while any share is active
    /// - the backend's error if the share cannot be created
    pub async fn start_remote_share(&self, state: &Value) -> CoreResult<String> {
        let remote = self.remote.as_ref().ok_or(CoreError::RemoteNotConfigured)?;
        let mode = self.mode();
        if mode.is_sharing() {
            return Err(CoreError::AlreadySharing(mode));
        }

        let credentials = remote.create_share(state).await?;
        let link = remote
            .share_link(&self.links.location().current())
            .ok_or(CoreError::NotSharing)?;
        let url = Url::parse(&link).map_err(|e| CoreError::InvalidAddress(e.to_string()))?;
        self.links.location().replace(url);
        self.set_mode(ShareMode::Remote).await;

        info!(share_id = credentials.share_id(), "remote sharing started");
        Ok(link)
    }

    /// The link to hand to the other person, if sharing.
    pub fn share_link(&self) -> Option<String> {
        let current = self.links.location().current();
        match self.mode() {
            ShareMode::None => None,
            ShareMode::Url => self.links.has_shared_data().then(|| current.to_string()),
            ShareMode::Remote => self.remote.as_ref()?.share_link(&current),
        }
    }

    /// Reference to a QR image of the active link.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotSharing`] without an active link.
    pub fn generate_qr_code(&self, size: Option<u32>) -> CoreResult<String> {
        let link = self.share_link().ok_or(CoreError::NotSharing)?;
        Ok(self.links.generate_qr_code(&link, size))
    }

    /// The active session, without any secret.
    pub fn session(&self) -> Option<ShareSession> {
        match self.mode() {
            ShareMode::None => None,
            ShareMode::Url => {
                let published = self.published.lock().clone();
                Some(ShareSession {
                    mode: ShareMode::Url,
                    remote_id: None,
                    last_fingerprint: published.as_ref().map(|p| p.fingerprint.clone()),
                    last_synced_at: published.map(|p| p.at),
                })
            }
            ShareMode::Remote => {
                let session = self.remote.as_ref()?.session()?;
                Some(ShareSession {
                    mode: ShareMode::Remote,
                    remote_id: Some(session.share_id),
                    last_fingerprint: session.last_fingerprint,
                    last_synced_at: session.last_synced_at,
                })
            }
        }
    }

    /// Sharing summary for the UI.
    pub fn get_sync_info(&self) -> SyncInfo {
        let mode = self.mode();
        SyncInfo {
            mode,
            status: self.status(),
            is_sharing: mode.is_sharing(),
            share_url: self.share_link(),
            backend: mode.backend_label(),
            session: self.session(),
        }
    }

    /// Stops sharing. Local data is kept.
    ///
    /// Clears the session, every pending timer and the share parameters in
    /// the address. Returns false if nothing was being shared.
    pub async fn leave_share(&self) -> bool {
        let mode = self.mode();
        if !mode.is_sharing() {
            debug!("leave requested while not sharing");
            return false;
        }

        if let (ShareMode::Remote, Some(remote)) = (mode, &self.remote) {
            remote.leave_share();
        }
        self.links.clear_share_params();
        *self.published.lock() = None;
        self.set_mode(ShareMode::None).await;
        self.set_status(SyncStatus::Idle);
        info!(mode = %mode, "left share");
        true
    }

    /// Produces a backup of the local snapshot.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NoLocalState`] if nothing was saved yet
    /// - the store error if the snapshot cannot be read
    pub async fn export_all_data(&self) -> CoreResult<Backup> {
        let state = self
            .store
            .try_load(STATE_KEY)
            .await?
            .ok_or(CoreError::NoLocalState)?;
        let backup = Backup::of(&state, Utc::now())?;
        info!(file = %backup.file_name, "backup exported");
        Ok(backup)
    }

    /// Replaces the local snapshot with a backup and replays it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Json`] if `contents` is not JSON
    /// - the store error if the snapshot cannot be saved
    pub async fn import_data(&self, contents: &str) -> CoreResult<Value> {
        let state: Value = serde_json::from_str(contents).map_err(|e| {
            error!(error = %e, "backup unreadable");
            e
        })?;
        self.store.try_save(STATE_KEY, state.clone()).await?;
        self.observer.on_state(state.clone()).await;
        info!("backup imported");
        Ok(state)
    }

    /// Erases every local key, ends any share and clears the address.
    ///
    /// Returns whether the store was cleared.
    pub async fn clear_all_data(&self) -> bool {
        if let Some(remote) = &self.remote {
            remote.leave_share();
        }
        self.links.clear_share_params();
        *self.published.lock() = None;
        *self.mode.write() = ShareMode::None;

        let cleared = self.store.clear().await;
        self.set_status(if cleared {
            SyncStatus::Idle
        } else {
            SyncStatus::Error
        });
        if cleared {
            info!("all local data cleared");
        }
        cleared
    }

    /// Records connectivity for remote sharing.
    pub async fn set_online(&self, online: bool) {
        if let Some(remote) = &self.remote {
            remote.set_online(online).await;
        }
    }

    /// Sends any pending remote push and stops every timer.
    pub async fn shutdown(&self) {
        if let Some(remote) = &self.remote {
            remote.shutdown().await;
        }
    }
}

impl std::fmt::Debug for HybridCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridCoordinator")
            .field("mode", &self.mode())
            .field("status", &self.status())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NullObserver;
    use amedias_codec::{Capabilities, StateCodec};
    use amedias_share_url::{MemoryLocation, ShareUrlConfig};
    use amedias_storage::StoreConfig;
    use serde_json::json;

    fn coordinator(address: &str) -> HybridCoordinator {
        let store = Arc::new(LocalStore::new(StoreConfig::in_memory()));
        let location = Arc::new(MemoryLocation::parse(address).unwrap());
        let links = Arc::new(ShareUrlManager::new(
            ShareUrlConfig::default(),
            StateCodec::new(Capabilities::probe()),
            location,
        ));
        HybridCoordinator::new(store, links, None, Arc::new(NullObserver))
    }

    #[tokio::test]
    async fn fresh_start_is_local_and_idle() {
        let coordinator = coordinator("https://amedias.app/");
        let startup = coordinator.init().await;

        assert_eq!(startup, Startup::Local { restored: false });
        assert_eq!(coordinator.mode(), ShareMode::None);
        assert_eq!(coordinator.status(), SyncStatus::Idle);
        assert!(!coordinator.has_remote_config());
    }

    #[tokio::test]
    async fn local_change_in_local_mode_only_persists() {
        let coordinator = coordinator("https://amedias.app/");
        coordinator.init().await;

        coordinator
            .on_local_change(json!({"calc": {"nomina1": 1}}))
            .await
            .unwrap();

        assert_eq!(coordinator.status(), SyncStatus::Synced);
        assert_eq!(coordinator.links().location().current().query(), None);
        assert_eq!(
            coordinator.store().load(STATE_KEY, Value::Null).await,
            json!({"calc": {"nomina1": 1}})
        );
    }

    #[tokio::test]
    async fn remote_share_needs_backend() {
        let coordinator = coordinator("https://amedias.app/");
        let err = coordinator.start_remote_share(&json!({})).await.unwrap_err();
        assert!(matches!(err, CoreError::RemoteNotConfigured));
    }

    #[tokio::test]
    async fn url_share_is_idempotent() {
        let coordinator = coordinator("https://amedias.app/");
        coordinator.init().await;

        let first = coordinator.start_url_share(&json!({"a": 1})).await.unwrap();
        let second = coordinator.start_url_share(&json!({"a": 2})).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(coordinator.links().location().current().as_str(), first);
    }

    #[tokio::test]
    async fn qr_code_needs_active_link() {
        let coordinator = coordinator("https://amedias.app/");
        coordinator.init().await;
        assert!(matches!(
            coordinator.generate_qr_code(None),
            Err(CoreError::NotSharing)
        ));

        let link = coordinator.start_url_share(&json!({"a": 1})).await.unwrap();
        let qr = coordinator.generate_qr_code(Some(200)).unwrap();
        assert!(qr.contains("size=200x200"));
        assert!(qr.len() > link.len());
    }

    #[tokio::test]
    async fn url_session_tracks_published_fingerprint() {
        let coordinator = coordinator("https://amedias.app/");
        coordinator.init().await;
        assert!(coordinator.session().is_none());

        let state = json!({"calc": {"fondoComun": 1200}});
        coordinator.start_url_share(&state).await.unwrap();

        let session = coordinator.session().unwrap();
        assert_eq!(session.mode, ShareMode::Url);
        assert_eq!(session.remote_id, None);
        assert_eq!(session.last_fingerprint, Some(Fingerprint::of(&state)));
        assert!(session.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn export_without_state_fails() {
        let coordinator = coordinator("https://amedias.app/");
        assert!(matches!(
            coordinator.export_all_data().await,
            Err(CoreError::NoLocalState)
        ));
    }

    #[tokio::test]
    async fn import_rejects_invalid_json() {
        let coordinator = coordinator("https://amedias.app/");
        assert!(matches!(
            coordinator.import_data("{ not json").await,
            Err(CoreError::Json(_))
        ));
        assert!(coordinator.store().list_keys().await.is_empty());
    }
}

//! Application context: builds every component once and tears them down.

use crate::coordinator::HybridCoordinator;
use crate::error::{CoreError, CoreResult};
use crate::model::Startup;
use crate::observer::StateObserver;
use amedias_codec::{Capabilities, StateCodec};
use amedias_share_url::{Location, MemoryLocation, ShareUrlConfig, ShareUrlManager};
use amedias_storage::{LocalStore, StoreConfig};
use amedias_sync_engine::{
    BackendConfig, RemoteBackend, RemoteSyncManager, RestBackend, SyncConfig,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// Configuration for an [`AppContext`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Address the application runs at, including any share parameters.
    pub address: Url,
    /// Local store settings.
    pub store: StoreConfig,
    /// Share link settings.
    pub share_url: ShareUrlConfig,
    /// Remote sync timings.
    pub sync: SyncConfig,
    /// Remote backend. Remote sharing is off unless it is enabled.
    pub backend: BackendConfig,
    /// Forced codec capabilities. `None` probes the platform.
    pub capabilities: Option<Capabilities>,
}

impl ContextConfig {
    /// Creates a local-only, in-memory configuration at `address`.
    pub fn new(address: Url) -> Self {
        Self {
            address,
            store: StoreConfig::in_memory(),
            share_url: ShareUrlConfig::default(),
            sync: SyncConfig::default(),
            backend: BackendConfig::default(),
            capabilities: None,
        }
    }

    /// Parses `address` and creates a configuration at it.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidAddress`] if `address` is not an absolute URL.
    pub fn parse(address: &str) -> CoreResult<Self> {
        let address = Url::parse(address)
            .map_err(|e| CoreError::InvalidAddress(format!("{address}: {e}")))?;
        Ok(Self::new(address))
    }

    /// Sets the local store settings.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Sets the share link settings.
    pub fn with_share_url(mut self, share_url: ShareUrlConfig) -> Self {
        self.share_url = share_url;
        self
    }

    /// Sets the remote sync timings.
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Sets the remote backend.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Forces the codec capabilities instead of probing.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}

/// Every long-lived component, built once at startup.
///
/// Replaces process-wide singletons: construct one with
/// [`AppContext::initialize`], pass it to consumers, and call
/// [`AppContext::shutdown`] before exit.
///
/// # Example
///
/// ```rust
/// use amedias_core::{AppContext, ContextConfig, NullObserver, Startup};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> amedias_core::CoreResult<()> {
/// let config = ContextConfig::parse("https://amedias.app/")?;
/// let ctx = AppContext::initialize(config, Arc::new(NullObserver)).await?;
/// assert_eq!(ctx.startup(), &Startup::Local { restored: false });
///
/// ctx.coordinator()
///     .on_local_change(serde_json::json!({"calc": {"nomina1": 1800}}))
///     .await?;
/// ctx.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct AppContext {
    coordinator: Arc<HybridCoordinator>,
    location: Arc<dyn Location>,
    startup: Startup,
    is_open: RwLock<bool>,
}

impl AppContext {
    /// Builds every component and runs startup mode selection.
    ///
    /// The address is held in memory. A REST backend is created when
    /// `config.backend` is enabled.
    ///
    /// # Errors
    ///
    /// [`CoreError::Sync`] if the backend configuration is unusable.
    pub async fn initialize(
        config: ContextConfig,
        observer: Arc<dyn StateObserver>,
    ) -> CoreResult<Self> {
        let location: Arc<dyn Location> = Arc::new(MemoryLocation::new(config.address.clone()));
        let backend: Option<Arc<dyn RemoteBackend>> = if config.backend.is_enabled() {
            Some(Arc::new(RestBackend::new(
                &config.backend,
                config.sync.request_timeout,
            )?))
        } else {
            None
        };
        Ok(Self::initialize_with(config, location, backend, observer).await)
    }

    /// Builds every component around a given address and backend.
    ///
    /// `config.address` and `config.backend` are ignored in favor of
    /// `location` and `backend`.
    pub async fn initialize_with(
        config: ContextConfig,
        location: Arc<dyn Location>,
        backend: Option<Arc<dyn RemoteBackend>>,
        observer: Arc<dyn StateObserver>,
    ) -> Self {
        let store = Arc::new(LocalStore::new(config.store));
        let codec = match config.capabilities {
            Some(capabilities) => StateCodec::new(capabilities),
            None => StateCodec::probe(),
        };
        debug!(compressing = codec.is_compressing(), "codec ready");

        let links = Arc::new(ShareUrlManager::new(
            config.share_url,
            codec,
            location.clone(),
        ));
        let remote = backend.map(|backend| RemoteSyncManager::new(backend, config.sync));
        let coordinator = Arc::new(HybridCoordinator::new(store, links, remote, observer));

        let startup = coordinator.init().await;
        info!(?startup, mode = %coordinator.mode(), "application context ready");

        Self {
            coordinator,
            location,
            startup,
            is_open: RwLock::new(true),
        }
    }

    /// The coordinator.
    pub fn coordinator(&self) -> &Arc<HybridCoordinator> {
        &self.coordinator
    }

    /// The local store.
    pub fn store(&self) -> &Arc<LocalStore> {
        self.coordinator.store()
    }

    /// The application address.
    pub fn location(&self) -> &Arc<dyn Location> {
        &self.location
    }

    /// What startup mode selection decided.
    pub fn startup(&self) -> &Startup {
        &self.startup
    }

    /// Returns true until [`AppContext::shutdown`] runs.
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Sends any pending remote push, stops polling and cancels timers.
    ///
    /// Later calls do nothing.
    pub async fn shutdown(&self) {
        {
            let mut is_open = self.is_open.write();
            if !*is_open {
                return;
            }
            *is_open = false;
        }
        self.coordinator.shutdown().await;
        info!("application context shut down");
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("coordinator", &self.coordinator)
            .field("startup", &self.startup)
            .field("open", &self.is_open())
            .finish()
    }
}

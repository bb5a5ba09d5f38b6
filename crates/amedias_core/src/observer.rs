//! Delivery of applied states to the application.

use crate::model::STATE_KEY;
use amedias_storage::LocalStore;
use amedias_sync_engine::RemoteStateHandler;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives every state the application should display.
///
/// Called with the local snapshot at startup, with states read from a
/// share link or pulled from a remote share, and after an import.
#[async_trait]
pub trait StateObserver: Send + Sync {
    /// Applies `state` to the application.
    async fn on_state(&self, state: Value);
}

/// An observer that ignores every state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

#[async_trait]
impl StateObserver for NullObserver {
    async fn on_state(&self, _state: Value) {}
}

/// Persists pulled remote states, then hands them to the observer.
pub(crate) struct RemoteApplier {
    store: Arc<LocalStore>,
    observer: Arc<dyn StateObserver>,
}

impl RemoteApplier {
    pub(crate) fn new(store: Arc<LocalStore>, observer: Arc<dyn StateObserver>) -> Self {
        Self { store, observer }
    }
}

#[async_trait]
impl RemoteStateHandler for RemoteApplier {
    async fn on_remote_state(&self, state: Value) {
        if !self.store.save(STATE_KEY, state.clone()).await {
            warn!("remote state not persisted locally");
        }
        debug!("forwarding remote state");
        self.observer.on_state(state).await;
    }
}

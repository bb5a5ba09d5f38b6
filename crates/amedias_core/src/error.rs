//! Error types for the coordinator.

use crate::model::ShareMode;
use amedias_share_url::ShareUrlError;
use amedias_storage::StorageError;
use amedias_sync_engine::SyncError;
use thiserror::Error;

/// Result type for coordinator operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the coordinator and the application context.
///
/// None of these is fatal: the local snapshot survives every one of them.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Share link could not be built or read.
    #[error("share link error: {0}")]
    ShareUrl(#[from] ShareUrlError),

    /// Remote sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Malformed JSON in an import.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A share is already active in the given mode.
    #[error("already sharing ({0})")]
    AlreadySharing(ShareMode),

    /// The operation needs an active share.
    #[error("not sharing")]
    NotSharing,

    /// Remote sharing was requested but no backend is configured.
    #[error("remote backend not configured")]
    RemoteNotConfigured,

    /// There is no local snapshot to export.
    #[error("no local state saved")]
    NoLocalState,

    /// The application address is not a valid absolute URL.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl CoreError {
    /// User-facing message.
    pub fn message(&self) -> String {
        match self {
            CoreError::ShareUrl(e) => e.message().to_string(),
            CoreError::AlreadySharing(_) => "Ya tienes un enlace compartido activo".to_string(),
            CoreError::NotSharing => "No hay enlace compartido activo".to_string(),
            CoreError::Json(_) => "Error al importar datos".to_string(),
            other => other.to_string(),
        }
    }
}

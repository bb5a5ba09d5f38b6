//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Backend address or API key missing or unusable.
    #[error("remote backend not configured: {0}")]
    NotConfigured(String),

    /// No remote share is active.
    #[error("no active remote share")]
    NotSharing,

    /// A remote share is already active.
    #[error("a remote share is already active")]
    AlreadySharing,

    /// No share matches the credentials.
    ///
    /// Also returned for a wrong secret, so callers cannot tell which half
    /// of the credentials was wrong.
    #[error("share not found")]
    NotFound,

    /// The device is offline.
    #[error("offline")]
    Offline,

    /// A push was attempted while a remote state was being applied.
    #[error("push refused while applying a remote state")]
    ApplyingRemote,

    /// Response body could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotFound => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Protocol(err.to_string())
        } else if err.is_builder() {
            SyncError::transport_fatal(err.to_string())
        } else {
            SyncError::transport_retryable(err.to_string())
        }
    }
}

//! # A Medias Sync Engine
//!
//! Keeps one remote share row in step with the local application state.
//!
//! This crate provides:
//! - A remote backend abstraction ([`RemoteBackend`]) with a REST client
//!   and an in-memory implementation
//! - Share credentials with a redacted, zeroized secret
//! - Cancellable timers driven by the tokio clock
//! - The sync state machine ([`RemoteSyncManager`])
//!
//! ## Sync model
//!
//! Last writer wins. Local edits are pushed after a short quiet period;
//! remote edits are pulled by polling and compared by fingerprint, so an
//! unchanged remote never disturbs the application.
//!
//! ## Key Invariants
//!
//! - Only the latest queued state is pushed after a quiet period
//! - A pulled state is never pushed back while it is being applied
//! - Failures retry with bounded exponential backoff, then stop until the
//!   next explicit trigger
//! - Leaving a share cancels every pending timer
//! - The share secret is never logged

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod config;
mod credentials;
mod error;
mod manager;
mod rest;
mod schedule;

pub use backend::{MemoryBackend, RemoteBackend, ShareRecord};
pub use config::{
    BackendConfig, RetryPolicy, SyncConfig, DEFAULT_TABLE, ENV_API_KEY, ENV_BACKEND_URL,
    ENV_TABLE,
};
pub use credentials::{ShareCredentials, SHARE_ID_LEN, SHARE_SECRET_LEN};
pub use error::{SyncError, SyncResult};
pub use manager::{
    FetchOutcome, Phase, RemoteStateHandler, RemoteSyncManager, SyncSession, SyncStatus,
};
pub use rest::RestBackend;
pub use schedule::{PeriodicTask, ScheduledTask};

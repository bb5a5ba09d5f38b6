//! # A Medias Core
//!
//! Sharing coordinator and application context for A Medias.
//!
//! This crate provides:
//! - The application snapshot model ([`AppState`]) and sharing modes
//! - [`HybridCoordinator`], the only component the UI talks to
//! - [`AppContext`], which builds every component once and shuts them down
//!
//! ## Sharing modes
//!
//! | Mode | Where the shared state lives |
//! |------|------------------------------|
//! | [`ShareMode::None`] | this device only |
//! | [`ShareMode::Url`] | inside the link itself |
//! | [`ShareMode::Remote`] | a remote row, polled and pushed |
//!
//! At most one mode is active. Local persistence happens in every mode.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod context;
mod coordinator;
mod error;
mod model;
mod observer;

pub use context::{AppContext, ContextConfig};
pub use coordinator::HybridCoordinator;
pub use error::{CoreError, CoreResult};
pub use model::{
    AppState, Backup, ShareMode, ShareSession, Startup, SyncInfo, DATA_VERSION, SHARE_MODE_KEY,
    STATE_KEY,
};
pub use observer::{NullObserver, StateObserver};

pub use amedias_sync_engine::SyncStatus;

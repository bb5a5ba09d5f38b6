//! # A Medias Storage
//!
//! Local persistent key/value store for A Medias.
//!
//! This crate keeps the device-local snapshot of the application state and a
//! handful of small flags (such as the active share mode). Tiers are **opaque
//! value stores** - they never interpret the JSON they hold.
//!
//! ## Design Principles
//!
//! - One async facade ([`LocalStore`]) over synchronous tiers
//! - Every operation waits for initialization to finish
//! - Initialization failure degrades silently to a durable [`KeyFileTier`]
//! - Per-key last-write-wins; no cross-key transactions
//!
//! ## Available Tiers
//!
//! - [`FileTier`] - durable JSON document guarded by a lock file
//! - [`KeyFileTier`] - durable fallback, one file per key
//! - [`MemoryTier`] - memory-only stores and tests
//!
//! ## Example
//!
//! ```rust
//! use amedias_storage::{MemoryTier, StorageTier};
//!
//! let tier = MemoryTier::new();
//! tier.put("a_medias_share_mode", serde_json::json!("none")).unwrap();
//! assert_eq!(tier.keys().unwrap(), vec!["a_medias_share_mode"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod file;
mod keyfile;
mod memory;
mod store;
mod tier;

pub use error::{StorageError, StorageResult};
pub use file::FileTier;
pub use keyfile::KeyFileTier;
pub use memory::MemoryTier;
pub use store::{LocalStore, StoreConfig, StoreStats, DEFAULT_FILE_NAME};
pub use tier::{Record, StorageTier, TierKind};

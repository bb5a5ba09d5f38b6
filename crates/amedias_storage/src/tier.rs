//! Storage tier trait definition.

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which tier a [`crate::LocalStore`] ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Durable file-backed records.
    File,
    /// Durable fallback with one file per key.
    KeyFiles,
    /// Process-local; nothing survives the process.
    Memory,
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierKind::File => f.write_str("file"),
            TierKind::KeyFiles => f.write_str("key_files"),
            TierKind::Memory => f.write_str("memory"),
        }
    }
}

/// A stored value together with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The record key.
    pub key: String,
    /// The stored value.
    pub data: Value,
    /// Write time in Unix milliseconds.
    pub timestamp: u64,
}

/// A synchronous key/value tier underneath [`crate::LocalStore`].
///
/// Tiers are **opaque value stores**. They never interpret the JSON values
/// they hold; the application decides what a key means.
///
/// # Invariants
///
/// - `put` replaces any previous value for the key (last write wins)
/// - `get` returns exactly the value most recently `put` for the key
/// - Writes to different keys are independent; there are no transactions
/// - Tiers must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::FileTier`] - durable storage
/// - [`super::KeyFileTier`] - durable fallback when the file tier is unavailable
/// - [`super::MemoryTier`] - memory-only stores and tests
pub trait StorageTier: Send + Sync {
    /// Returns the record stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<Record>>;

    /// Stores `data` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be made durable.
    fn put(&self, key: &str, data: Value) -> StorageResult<()>;

    /// Removes `key`. Returns whether a value was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be made durable.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Lists every stored key in sorted order.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Removes every key.
    ///
    /// # Errors
    ///
    /// Returns an error if the tier cannot be written.
    fn clear(&self) -> StorageResult<()>;

    /// Which kind of tier this is.
    fn kind(&self) -> TierKind;
}

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_kind_display() {
        assert_eq!(TierKind::File.to_string(), "file");
        assert_eq!(TierKind::Memory.to_string(), "memory");
        assert_eq!(
            serde_json::to_value(TierKind::KeyFiles).unwrap(),
            TierKind::KeyFiles.to_string()
        );
    }

    #[test]
    fn record_serializes_field_names() {
        let record = Record {
            key: "a_medias_app_state".into(),
            data: serde_json::json!({"version": 2}),
            timestamp: 42,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"], "a_medias_app_state");
        assert_eq!(json["data"]["version"], 2);
        assert_eq!(json["timestamp"], 42);
    }
}

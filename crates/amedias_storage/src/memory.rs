//! In-memory storage tier.

use crate::error::StorageResult;
use crate::tier::{now_millis, Record, StorageTier, TierKind};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// An in-memory storage tier.
///
/// This tier keeps every record in memory and is used:
/// - For stores configured without a directory
/// - As the last resort when no durable tier can be opened
/// - In unit and integration tests
///
/// Nothing survives the process.
///
/// # Example
///
/// ```rust
/// use amedias_storage::{MemoryTier, StorageTier};
///
/// let tier = MemoryTier::new();
/// tier.put("theme", serde_json::json!("dark")).unwrap();
/// assert_eq!(tier.get("theme").unwrap().unwrap().data, "dark");
/// ```
#[derive(Debug, Default)]
pub struct MemoryTier {
    records: RwLock<BTreeMap<String, Record>>,
}

impl MemoryTier {
    /// Creates a new empty in-memory tier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tier pre-populated with records.
    ///
    /// Used to seed a store with known contents.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Returns a copy of every record.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.records.read().values().cloned().collect()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl StorageTier for MemoryTier {
    fn get(&self, key: &str) -> StorageResult<Option<Record>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, key: &str, data: Value) -> StorageResult<()> {
        let record = Record {
            key: key.to_string(),
            data,
            timestamp: now_millis(),
        };
        self.records.write().insert(key.to_string(), record);
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.records.write().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        self.records.write().clear();
        Ok(())
    }

    fn kind(&self) -> TierKind {
        TierKind::Memory
    }
}

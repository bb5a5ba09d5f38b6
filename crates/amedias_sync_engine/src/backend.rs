//! Remote backend abstraction.

use crate::credentials::ShareCredentials;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// One share as returned by a backend.
///
/// Never carries the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareRecord {
    /// Share id.
    pub share_id: String,
    /// The shared state.
    pub payload: Value,
    /// When the share was created, if the backend reported it.
    pub created_at: Option<DateTime<Utc>>,
    /// When the payload last changed.
    pub updated_at: DateTime<Utc>,
}

/// A store holding one row per share, addressed by id and secret.
///
/// Every lookup matches the exact `(id, secret)` pair. A wrong secret looks
/// the same as an unknown id.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Creates a share row.
    async fn create(&self, credentials: &ShareCredentials, payload: &Value)
        -> SyncResult<ShareRecord>;

    /// Fetches a share row. `None` if nothing matches.
    async fn fetch(&self, credentials: &ShareCredentials) -> SyncResult<Option<ShareRecord>>;

    /// Replaces the payload of a share row.
    ///
    /// Returns [`SyncError::NotFound`] if nothing matches.
    async fn update(&self, credentials: &ShareCredentials, payload: &Value)
        -> SyncResult<ShareRecord>;
}

#[derive(Debug, Clone)]
struct StoredRow {
    secret: String,
    record: ShareRecord,
}

/// An in-process backend for tests and offline runs.
///
/// Supports failure injection, an offline switch, per-operation call
/// counters and a log of every written payload.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<HashMap<String, StoredRow>>,
    writes: Mutex<Vec<Value>>,
    fail_next: AtomicU32,
    offline: AtomicBool,
    creates: AtomicUsize,
    fetches: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls fail with a retryable transport error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes every call fail as unreachable while `offline` is true.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `create` calls, failed ones included.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `fetch` calls, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of `update` calls, failed ones included.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Every payload successfully written, oldest first.
    pub fn writes(&self) -> Vec<Value> {
        self.writes.lock().clone()
    }

    /// The most recent successfully written payload.
    pub fn last_write(&self) -> Option<Value> {
        self.writes.lock().last().cloned()
    }

    /// Number of share rows.
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns the stored payload for `share_id`, ignoring the secret.
    pub fn payload_of(&self, share_id: &str) -> Option<Value> {
        self.rows
            .read()
            .get(share_id)
            .map(|row| row.record.payload.clone())
    }

    /// Writes `payload` as another device would: no counters, no failures.
    ///
    /// Returns false if no row matches.
    pub fn remote_write(&self, credentials: &ShareCredentials, payload: Value) -> bool {
        let mut rows = self.rows.write();
        match lookup_mut(&mut rows, credentials) {
            Some(row) => {
                row.record.payload = payload;
                row.record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Sets the row's `updated_at` without touching its payload.
    pub fn touch(&self, credentials: &ShareCredentials, at: DateTime<Utc>) -> bool {
        let mut rows = self.rows.write();
        match lookup_mut(&mut rows, credentials) {
            Some(row) => {
                row.record.updated_at = at;
                true
            }
            None => false,
        }
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("backend unreachable"));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SyncError::transport_retryable("injected failure"));
        }
        Ok(())
    }
}

fn lookup_mut<'a>(
    rows: &'a mut HashMap<String, StoredRow>,
    credentials: &ShareCredentials,
) -> Option<&'a mut StoredRow> {
    rows.get_mut(credentials.share_id())
        .filter(|row| row.secret == credentials.secret())
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    async fn create(
        &self,
        credentials: &ShareCredentials,
        payload: &Value,
    ) -> SyncResult<ShareRecord> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut rows = self.rows.write();
        if rows.contains_key(credentials.share_id()) {
            return Err(SyncError::transport_fatal("duplicate share id"));
        }

        let now = Utc::now();
        let record = ShareRecord {
            share_id: credentials.share_id().to_string(),
            payload: payload.clone(),
            created_at: Some(now),
            updated_at: now,
        };
        rows.insert(
            credentials.share_id().to_string(),
            StoredRow {
                secret: credentials.secret().to_string(),
                record: record.clone(),
            },
        );
        self.writes.lock().push(payload.clone());
        Ok(record)
    }

    async fn fetch(&self, credentials: &ShareCredentials) -> SyncResult<Option<ShareRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let rows = self.rows.read();
        Ok(rows
            .get(credentials.share_id())
            .filter(|row| row.secret == credentials.secret())
            .map(|row| row.record.clone()))
    }

    async fn update(
        &self,
        credentials: &ShareCredentials,
        payload: &Value,
    ) -> SyncResult<ShareRecord> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut rows = self.rows.write();
        let row = lookup_mut(&mut rows, credentials).ok_or(SyncError::NotFound)?;
        row.record.payload = payload.clone();
        row.record.updated_at = Utc::now();
        let record = row.record.clone();
        drop(rows);

        self.writes.lock().push(payload.clone());
        Ok(record)
    }
}

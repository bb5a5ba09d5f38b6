//! File-based storage tier for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::tier::{now_millis, Record, StorageTier, TierKind};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lock file guarding the store directory.
const LOCK_FILE: &str = "LOCK";

/// Document format version written to disk.
const DOCUMENT_VERSION: u32 = 1;

/// On-disk layout of the store document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    version: u32,
    records: Vec<Record>,
}

/// A file-based storage tier.
///
/// All records live in a single JSON document inside the store directory.
/// The document is cached in memory and rewritten on every mutation.
/// Data survives process restarts.
///
/// # Durability
///
/// Each mutation writes the whole document to a sibling temp file, calls
/// `sync_all`, then renames it over the previous document, so a crash
/// leaves either the old or the new document, never a torn one.
///
/// # Locking
///
/// The directory is guarded by an exclusive `fs2` lock on a `LOCK` file.
/// A second process opening the same directory gets
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use amedias_storage::{FileTier, StorageTier};
/// use std::path::Path;
///
/// let tier = FileTier::open(Path::new("data"), "a_medias_db.json").unwrap();
/// tier.put("a_medias_share_mode", serde_json::json!("none")).unwrap();
/// ```
#[derive(Debug)]
pub struct FileTier {
    path: PathBuf,
    records: RwLock<BTreeMap<String, Record>>,
    _lock_file: File,
}

impl FileTier {
    /// Opens or creates a file tier in `dir`, storing records in `file_name`.
    ///
    /// Creates `dir` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the lock is held
    /// elsewhere, or an existing document cannot be parsed.
    pub fn open(dir: &Path, file_name: &str) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(dir.display().to_string()));
        }

        let path = dir.join(file_name);
        let records = Self::read_document(&path)?;

        Ok(Self {
            path,
            records: RwLock::new(records),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the store document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(path: &Path) -> StorageResult<BTreeMap<String, Record>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }

        let document: Document = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupted(format!("{}: {}", path.display(), e)))?;

        if document.version > DOCUMENT_VERSION {
            return Err(StorageError::Corrupted(format!(
                "unsupported document version {}",
                document.version
            )));
        }

        Ok(document
            .records
            .into_iter()
            .map(|record| (record.key.clone(), record))
            .collect())
    }

    fn persist(&self, records: &BTreeMap<String, Record>) -> StorageResult<()> {
        let document = Document {
            version: DOCUMENT_VERSION,
            records: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec(&document)?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl StorageTier for FileTier {
    fn get(&self, key: &str) -> StorageResult<Option<Record>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, key: &str, data: Value) -> StorageResult<()> {
        let mut records = self.records.write();
        let record = Record {
            key: key.to_string(),
            data,
            timestamp: now_millis(),
        };
        let previous = records.insert(key.to_string(), record);

        if let Err(e) = self.persist(&records) {
            // Keep the cache in step with what is on disk.
            match previous {
                Some(previous) => records.insert(key.to_string(), previous),
                None => records.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut records = self.records.write();
        let Some(previous) = records.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&records) {
            records.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut records = self.records.write();
        self.persist(&BTreeMap::new())?;
        records.clear();
        Ok(())
    }

    fn kind(&self) -> TierKind {
        TierKind::File
    }
}

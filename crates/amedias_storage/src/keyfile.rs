//! One-file-per-key storage tier.

use crate::error::{StorageError, StorageResult};
use crate::tier::{now_millis, Record, StorageTier, TierKind};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// A durable tier keeping each key in its own JSON file.
///
/// There is no lock file and no shared document, so it opens where
/// [`crate::FileTier`] cannot: a directory held by another process, or one
/// whose document is unreadable. Each file holds one [`Record`] and is
/// replaced atomically through a temp file.
#[derive(Debug)]
pub struct KeyFileTier {
    dir: PathBuf,
}

impl KeyFileTier {
    /// Opens or creates the tier in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the directory holding the key files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns every stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if a key file cannot be read.
    pub fn records(&self) -> StorageResult<Vec<Record>> {
        let mut records = Vec::new();
        for key in self.keys()? {
            if let Some(record) = self.get(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", escape(key), EXTENSION))
    }
}

/// Keeps `[A-Za-z0-9_-]` and writes every other byte as `%XX`.
fn escape(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn unescape(name: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(name.len());
    let mut rest = name.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'%' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(first);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

impl StorageTier for KeyFileTier {
    fn get(&self, key: &str) -> StorageResult<Option<Record>> {
        let path = self.path_of(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupted(format!("{}: {}", path.display(), e)))?;
        Ok(Some(record))
    }

    fn put(&self, key: &str, data: Value) -> StorageResult<()> {
        let record = Record {
            key: key.to_string(),
            data,
            timestamp: now_millis(),
        };
        let bytes = serde_json::to_vec(&record)?;

        let path = self.path_of(key);
        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        match fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(unescape)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> StorageResult<()> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }

    fn kind(&self) -> TierKind {
        TierKind::KeyFiles
    }
}

//! Async key/value store facade over a storage tier.

use crate::error::{StorageError, StorageResult};
use crate::file::FileTier;
use crate::keyfile::KeyFileTier;
use crate::memory::MemoryTier;
use crate::tier::{StorageTier, TierKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Default name of the store document.
pub const DEFAULT_FILE_NAME: &str = "a_medias_db.json";

/// Configuration for a [`LocalStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the store document. `None` keeps everything in memory.
    pub dir: Option<PathBuf>,
    /// Name of the store document inside `dir`.
    pub file_name: String,
}

impl StoreConfig {
    /// Creates a configuration for a durable store in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }

    /// Creates a configuration for a memory-only store.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }

    /// Sets the store document name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Summary of what a store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Tier in use.
    pub backend: TierKind,
    /// Number of stored keys.
    pub item_count: usize,
    /// Path of the store document for the file tier.
    pub location: Option<PathBuf>,
}

/// The local persistent store.
///
/// Every operation first waits for initialization to finish. Initialization
/// opens the file tier and never fails the caller:
///
/// - an unreadable document is moved aside (`*.corrupt`) and a fresh one
///   started
/// - if the document still cannot be opened (for example another process
///   holds the lock) the store continues on a [`KeyFileTier`] next to it
/// - the next successful open of the file tier takes those records back
/// - only when no durable tier can be opened does it run on a [`MemoryTier`]
///
/// Operations mirror a boolean/default contract (`save` returns `false` on
/// failure, `load` returns the default) so the application keeps running on
/// a broken disk. The `try_*` variants expose the underlying error.
///
/// # Example
///
/// ```rust
/// use amedias_storage::{LocalStore, StoreConfig};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = LocalStore::new(StoreConfig::in_memory());
/// assert!(store.save("a_medias_share_mode", json!("url")).await);
/// assert_eq!(store.load("a_medias_share_mode", json!("none")).await, json!("url"));
/// # }
/// ```
pub struct LocalStore {
    config: StoreConfig,
    tier: OnceCell<Arc<dyn StorageTier>>,
}

impl LocalStore {
    /// Creates a store. Initialization happens on first use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            tier: OnceCell::new(),
        }
    }

    /// Creates a store over an already-open tier.
    pub fn with_tier(tier: Arc<dyn StorageTier>) -> Self {
        Self {
            config: StoreConfig::in_memory(),
            tier: OnceCell::new_with(Some(tier)),
        }
    }

    /// Returns true once initialization has finished.
    pub fn is_ready(&self) -> bool {
        self.tier.initialized()
    }

    /// Waits for initialization and returns the tier in use.
    pub async fn kind(&self) -> TierKind {
        self.tier().await.kind()
    }

    async fn tier(&self) -> &Arc<dyn StorageTier> {
        self.tier.get_or_init(|| self.open_tier()).await
    }

    async fn open_tier(&self) -> Arc<dyn StorageTier> {
        let Some(dir) = self.config.dir.clone() else {
            debug!("opening memory-only store");
            return Arc::new(MemoryTier::new());
        };

        let file_name = self.config.file_name.clone();
        let opened = tokio::task::spawn_blocking(move || open_durable(&dir, &file_name)).await;

        match opened {
            Ok(Ok(tier)) => tier,
            Ok(Err(e)) => {
                error!(error = %e, "no durable store available, falling back to memory");
                Arc::new(MemoryTier::new())
            }
            Err(e) => {
                error!(error = %e, "store initialization aborted, falling back to memory");
                Arc::new(MemoryTier::new())
            }
        }
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns the tier's error if the write fails.
    pub async fn try_save(&self, key: &str, value: Value) -> StorageResult<()> {
        self.tier().await.put(key, value)?;
        debug!(key, "saved");
        Ok(())
    }

    /// Stores `value` under `key`. Returns whether the write succeeded.
    pub async fn save(&self, key: &str, value: Value) -> bool {
        match self.try_save(key, value).await {
            Ok(()) => true,
            Err(e) => {
                error!(key, error = %e, "save failed");
                false
            }
        }
    }

    /// Serializes and stores `value` under `key`.
    pub async fn save_as<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.save(key, value).await,
            Err(e) => {
                error!(key, error = %e, "value not serializable");
                false
            }
        }
    }

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns the tier's error if the read fails.
    pub async fn try_load(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.tier().await.get(key)?.map(|record| record.data))
    }

    /// Reads the value stored under `key`, or `default` if absent or unreadable.
    pub async fn load(&self, key: &str, default: Value) -> Value {
        match self.try_load(key).await {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(e) => {
                error!(key, error = %e, "load failed");
                default
            }
        }
    }

    /// Reads and deserializes the value stored under `key`.
    ///
    /// Returns `None` when the key is absent or holds a value of another shape.
    pub async fn load_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.try_load(key).await.ok()??;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key, error = %e, "stored value has unexpected shape");
                None
            }
        }
    }

    /// Removes `key`. Returns whether the removal succeeded.
    pub async fn remove(&self, key: &str) -> bool {
        match self.tier().await.delete(key) {
            Ok(_) => {
                debug!(key, "removed");
                true
            }
            Err(e) => {
                error!(key, error = %e, "remove failed");
                false
            }
        }
    }

    /// Lists every stored key.
    pub async fn list_keys(&self) -> Vec<String> {
        self.tier().await.keys().unwrap_or_else(|e| {
            error!(error = %e, "listing keys failed");
            Vec::new()
        })
    }

    /// Removes every key. Returns whether the store was cleared.
    pub async fn clear(&self) -> bool {
        match self.tier().await.clear() {
            Ok(()) => {
                info!("local store cleared");
                true
            }
            Err(e) => {
                error!(error = %e, "clear failed");
                false
            }
        }
    }

    /// Returns a summary of the store.
    pub async fn stats(&self) -> StoreStats {
        let tier = self.tier().await;
        let backend = tier.kind();
        let location = match (backend, &self.config.dir) {
            (TierKind::File, Some(dir)) => Some(document_path(dir, &self.config.file_name)),
            (TierKind::KeyFiles, Some(dir)) => Some(fallback_dir(dir, &self.config.file_name)),
            _ => None,
        };
        StoreStats {
            backend,
            item_count: tier.keys().map(|keys| keys.len()).unwrap_or(0),
            location,
        }
    }
}

fn document_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(file_name)
}

fn fallback_dir(dir: &Path, file_name: &str) -> PathBuf {
    document_path(dir, file_name).with_extension("keys")
}

/// Opens the best durable tier available in `dir`.
fn open_durable(dir: &Path, file_name: &str) -> StorageResult<Arc<dyn StorageTier>> {
    let keys_dir = fallback_dir(dir, file_name);

    let opened = match FileTier::open(dir, file_name) {
        Err(StorageError::Corrupted(reason)) => {
            let path = document_path(dir, file_name);
            let aside = path.with_extension("corrupt");
            warn!(
                %reason,
                moved_to = %aside.display(),
                "store document unreadable, starting a new one"
            );
            std::fs::rename(&path, &aside)?;
            FileTier::open(dir, file_name)
        }
        other => other,
    };

    match opened {
        Ok(tier) => {
            absorb_fallback(&tier, &keys_dir)?;
            info!(path = %tier.path().display(), "local store opened");
            Ok(Arc::new(tier))
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %keys_dir.display(),
                "file store unavailable, using key files"
            );
            Ok(Arc::new(KeyFileTier::open(&keys_dir)?))
        }
    }
}

/// Moves records left in the fallback directory into the file tier.
/// A record replaces the document's copy only if it was written later.
fn absorb_fallback(tier: &FileTier, keys_dir: &Path) -> StorageResult<()> {
    if !keys_dir.is_dir() {
        return Ok(());
    }

    let fallback = KeyFileTier::open(keys_dir)?;
    let mut moved = 0usize;
    for record in fallback.records()? {
        let newer = match tier.get(&record.key)? {
            Some(current) => record.timestamp > current.timestamp,
            None => true,
        };
        if newer {
            tier.put(&record.key, record.data)?;
            moved += 1;
        }
    }
    std::fs::remove_dir_all(keys_dir)?;
    info!(moved, "fallback records restored into the store document");
    Ok(())
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn store_initializes_lazily() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(StoreConfig::new(dir.path()));
        assert!(!store.is_ready());

        store.list_keys().await;
        assert!(store.is_ready());
        assert_eq!(store.kind().await, TierKind::File);
    }

    #[tokio::test]
    async fn store_save_load_remove() {
        let store = LocalStore::new(StoreConfig::in_memory());

        assert!(store.save("a", json!({"x": 1})).await);
        assert_eq!(store.load("a", json!(null)).await, json!({"x": 1}));

        assert!(store.remove("a").await);
        assert_eq!(store.load("a", json!("fallback")).await, json!("fallback"));
    }

    #[tokio::test]
    async fn store_typed_helpers() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Prefs {
            tab: String,
        }

        let store = LocalStore::new(StoreConfig::in_memory());
        let prefs = Prefs { tab: "split".into() };
        assert!(store.save_as("prefs", &prefs).await);
        assert_eq!(store.load_as::<Prefs>("prefs").await, Some(prefs));

        store.save("prefs", json!(42)).await;
        assert_eq!(store.load_as::<Prefs>("prefs").await, None);
    }

    #[tokio::test]
    async fn store_survives_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = LocalStore::new(StoreConfig::new(dir.path()));
            store.save("a_medias_app_state", json!({"version": 2})).await;
        }

        let store = LocalStore::new(StoreConfig::new(dir.path()));
        assert_eq!(
            store.load("a_medias_app_state", json!(null)).await,
            json!({"version": 2})
        );
    }

    #[tokio::test]
    async fn store_falls_back_to_key_files_when_locked() {
        let dir = tempdir().unwrap();
        let holder = FileTier::open(dir.path(), DEFAULT_FILE_NAME).unwrap();

        {
            let store = LocalStore::new(StoreConfig::new(dir.path()));
            assert!(store.save("a", json!(1)).await);
            assert_eq!(store.kind().await, TierKind::KeyFiles);
            assert_eq!(
                store.stats().await.location,
                Some(dir.path().join("a_medias_db.keys"))
            );
        }

        // Still locked: the fallback is durable on its own.
        {
            let store = LocalStore::new(StoreConfig::new(dir.path()));
            assert_eq!(store.kind().await, TierKind::KeyFiles);
            assert_eq!(store.load("a", json!(0)).await, json!(1));
        }

        // Lock released: the records move back into the document.
        drop(holder);
        let store = LocalStore::new(StoreConfig::new(dir.path()));
        assert_eq!(store.kind().await, TierKind::File);
        assert_eq!(store.load("a", json!(0)).await, json!(1));
        assert!(!dir.path().join("a_medias_db.keys").exists());
    }

    #[tokio::test]
    async fn store_recovers_from_corrupted_document() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_FILE_NAME), b"garbage").unwrap();

        {
            let store = LocalStore::new(StoreConfig::new(dir.path()));
            assert_eq!(store.kind().await, TierKind::File);
            assert!(store.list_keys().await.is_empty());
            assert!(store.save("a_medias_app_state", json!({"version": 2})).await);
        }
        assert_eq!(
            std::fs::read(dir.path().join("a_medias_db.corrupt")).unwrap(),
            b"garbage"
        );

        let store = LocalStore::new(StoreConfig::new(dir.path()));
        assert_eq!(
            store.load("a_medias_app_state", json!(null)).await,
            json!({"version": 2})
        );
    }

    #[tokio::test]
    async fn fallback_record_older_than_document_is_ignored() {
        let dir = tempdir().unwrap();
        let keys_dir = dir.path().join("a_medias_db.keys");
        KeyFileTier::open(&keys_dir)
            .unwrap()
            .put("mode", json!("stale"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        FileTier::open(dir.path(), DEFAULT_FILE_NAME)
            .unwrap()
            .put("mode", json!("fresh"))
            .unwrap();

        let store = LocalStore::new(StoreConfig::new(dir.path()));
        assert_eq!(store.load("mode", json!(null)).await, json!("fresh"));
        assert!(!keys_dir.exists());
    }

    #[tokio::test]
    async fn store_clear_and_stats() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(StoreConfig::new(dir.path()));
        store.save("a", json!(1)).await;
        store.save("b", json!(2)).await;

        let stats = store.stats().await;
        assert_eq!(stats.backend, TierKind::File);
        assert_eq!(stats.item_count, 2);
        assert_eq!(stats.location, Some(dir.path().join(DEFAULT_FILE_NAME)));

        assert!(store.clear().await);
        assert_eq!(store.stats().await.item_count, 0);
    }

    #[tokio::test]
    async fn store_with_existing_tier() {
        let tier = Arc::new(MemoryTier::new());
        tier.put("seed", json!("x")).unwrap();

        let store = LocalStore::with_tier(tier);
        assert!(store.is_ready());
        assert_eq!(store.list_keys().await, vec!["seed"]);
    }
}

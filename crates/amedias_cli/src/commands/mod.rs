//! CLI command implementations.

pub mod backup;
pub mod share;
pub mod status;

use amedias_codec::Capabilities;
use amedias_core::{AppContext, ContextConfig, NullObserver};
use amedias_storage::StoreConfig;
use amedias_sync_engine::BackendConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Local store directory; in memory when absent.
    pub data_dir: Option<PathBuf>,
    /// Application address.
    pub base_url: String,
    /// Remote backend address; empty disables remote sharing.
    pub backend_url: String,
    /// Remote backend API key.
    pub api_key: String,
    /// Remote table name.
    pub table: String,
    /// Whether link payloads may be compressed.
    pub compress: bool,
}

impl Settings {
    /// Builds the context configuration for `address`.
    pub fn context_config(
        &self,
        address: &str,
    ) -> Result<ContextConfig, Box<dyn std::error::Error>> {
        let store = match &self.data_dir {
            Some(dir) => StoreConfig::new(dir),
            None => StoreConfig::in_memory(),
        };
        let backend =
            BackendConfig::new(&self.backend_url, &self.api_key).with_table(&self.table);

        let mut config = ContextConfig::parse(address)?
            .with_store(store)
            .with_backend(backend);
        if !self.compress {
            config = config.with_capabilities(Capabilities::none());
        }
        Ok(config)
    }

    /// Opens the application at `address`, or at the base address.
    pub async fn open(
        &self,
        address: Option<&str>,
    ) -> Result<AppContext, Box<dyn std::error::Error>> {
        let config = self.context_config(address.unwrap_or(&self.base_url))?;
        Ok(AppContext::initialize(config, Arc::new(NullObserver)).await?)
    }
}

/// Reads a JSON state file.
pub fn read_state(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let state = serde_json::from_str(&text)
        .map_err(|e| format!("{} is not valid JSON: {}", path.display(), e))?;
    Ok(state)
}

//! Application state and sharing model.

use amedias_codec::Fingerprint;
use amedias_sync_engine::SyncStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Store key holding the local snapshot.
pub const STATE_KEY: &str = "a_medias_app_state";

/// Store key holding the persisted share mode.
pub const SHARE_MODE_KEY: &str = "a_medias_share_mode";

/// Current snapshot format version.
pub const DATA_VERSION: u32 = 2;

/// The application snapshot.
///
/// Sync components treat snapshots as opaque JSON; this type only gives the
/// application a typed view. Fields it does not know are dropped on
/// conversion, so keep the raw [`Value`] when forwarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Snapshot format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Visible tab.
    #[serde(default)]
    pub active_tab: Option<String>,
    /// Calculator inputs.
    #[serde(default)]
    pub calc: Value,
    /// Reimbursement list.
    #[serde(default)]
    pub reimbursements: Vec<Value>,
    /// When the snapshot was taken.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    DATA_VERSION
}

impl AppState {
    /// Creates a snapshot of the current version, stamped now.
    pub fn new(calc: Value, reimbursements: Vec<Value>) -> Self {
        Self {
            version: DATA_VERSION,
            active_tab: None,
            calc,
            reimbursements,
            timestamp: Some(Utc::now()),
        }
    }

    /// Sets the visible tab.
    pub fn with_active_tab(mut self, tab: impl Into<String>) -> Self {
        self.active_tab = Some(tab.into());
        self
    }

    /// Converts to the opaque snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be serialized.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Reads a typed view of an opaque snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is not an object of the expected shape.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

/// How the state is being shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareMode {
    /// Local only.
    #[default]
    #[serde(rename = "none")]
    None,
    /// The state travels inside the link.
    #[serde(rename = "url")]
    Url,
    /// The state lives in a remote row addressed by id and secret.
    #[serde(rename = "supabase")]
    Remote,
}

impl ShareMode {
    /// Name persisted in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareMode::None => "none",
            ShareMode::Url => "url",
            ShareMode::Remote => "supabase",
        }
    }

    /// Human-readable backend label.
    pub fn backend_label(&self) -> &'static str {
        match self {
            ShareMode::None => "Local Only",
            ShareMode::Url => "URL (Local First)",
            ShareMode::Remote => "Supabase (Legacy)",
        }
    }

    /// Returns true for any mode other than [`ShareMode::None`].
    pub fn is_sharing(&self) -> bool {
        *self != ShareMode::None
    }
}

impl std::fmt::Display for ShareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active share, without its secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSession {
    /// Sharing mode.
    pub mode: ShareMode,
    /// Remote share id, in remote mode.
    pub remote_id: Option<String>,
    /// Fingerprint of the last state known to be shared.
    pub last_fingerprint: Option<Fingerprint>,
    /// When the shared copy was last confirmed.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Sharing summary for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    /// Sharing mode.
    pub mode: ShareMode,
    /// Current sync status.
    pub status: SyncStatus,
    /// Whether any share is active.
    pub is_sharing: bool,
    /// Link to hand to the other person, if any.
    pub share_url: Option<String>,
    /// Human-readable backend label.
    pub backend: &'static str,
    /// Session details, when sharing.
    pub session: Option<ShareSession>,
}

/// Where the state came from at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
    /// The address carried an embedded state, now adopted.
    SharedLink {
        /// Whether the link's fingerprint matched its payload.
        integrity: amedias_share_url::Integrity,
    },
    /// The address carried remote share credentials; the share was joined.
    RemoteShare {
        /// Share id.
        share_id: String,
        /// Whether the first pull succeeded.
        reached: bool,
    },
    /// The embedded state could not be read; the local snapshot was used.
    BrokenLink {
        /// Stable failure code.
        code: &'static str,
        /// Whether a local snapshot was replayed.
        restored: bool,
    },
    /// No share in the address.
    Local {
        /// Whether a local snapshot was replayed.
        restored: bool,
    },
}

/// A backup ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    /// Suggested file name, `a-medias-backup-YYYY-MM-DD.json`.
    pub file_name: String,
    /// Pretty-printed JSON snapshot.
    pub contents: String,
}

impl Backup {
    pub(crate) fn of(state: &Value, now: DateTime<Utc>) -> serde_json::Result<Self> {
        Ok(Self {
            file_name: format!("a-medias-backup-{}.json", now.format("%Y-%m-%d")),
            contents: serde_json::to_string_pretty(state)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn app_state_uses_wire_keys() {
        let state = AppState::new(json!({"nomina1": 1800}), vec![]).with_active_tab("split");
        let value = state.to_value().unwrap();

        assert_eq!(value["version"], 2);
        assert_eq!(value["activeTab"], "split");
        assert_eq!(value["calc"]["nomina1"], 1800);
        assert!(value["reimbursements"].as_array().unwrap().is_empty());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn app_state_reads_browser_snapshot() {
        let value = json!({
            "version": 2,
            "activeTab": "calc",
            "calc": {"nomina1": 1800, "nomina2": 1500},
            "reimbursements": [{"concepto": "dentista", "importe": 120}],
            "timestamp": "2025-03-01T10:20:30.000Z"
        });
        let state = AppState::from_value(value).unwrap();

        assert_eq!(state.active_tab.as_deref(), Some("calc"));
        assert_eq!(state.reimbursements.len(), 1);
        assert_eq!(
            state.timestamp,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 20, 30).unwrap())
        );
    }

    #[test]
    fn app_state_fills_missing_fields() {
        let state = AppState::from_value(json!({"calc": {}})).unwrap();
        assert_eq!(state.version, DATA_VERSION);
        assert!(state.active_tab.is_none());
        assert!(state.timestamp.is_none());
    }

    #[test]
    fn share_mode_keeps_persisted_names() {
        assert_eq!(serde_json::to_value(ShareMode::None).unwrap(), "none");
        assert_eq!(serde_json::to_value(ShareMode::Url).unwrap(), "url");
        assert_eq!(serde_json::to_value(ShareMode::Remote).unwrap(), "supabase");
        assert_eq!(
            serde_json::from_value::<ShareMode>(json!("supabase")).unwrap(),
            ShareMode::Remote
        );
        assert!(serde_json::from_value::<ShareMode>(json!("carrier-pigeon")).is_err());
    }

    #[test]
    fn share_mode_labels() {
        assert_eq!(ShareMode::None.backend_label(), "Local Only");
        assert_eq!(ShareMode::Url.backend_label(), "URL (Local First)");
        assert_eq!(ShareMode::Remote.backend_label(), "Supabase (Legacy)");
        assert!(!ShareMode::None.is_sharing());
        assert!(ShareMode::Url.is_sharing());
    }

    #[test]
    fn sync_info_serializes_camel_case() {
        let info = SyncInfo {
            mode: ShareMode::Url,
            status: SyncStatus::Synced,
            is_sharing: true,
            share_url: Some("https://amedias.app/?d=x".into()),
            backend: ShareMode::Url.backend_label(),
            session: None,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["mode"], "url");
        assert_eq!(value["status"], "synced");
        assert_eq!(value["isSharing"], true);
        assert_eq!(value["shareUrl"], "https://amedias.app/?d=x");
        assert_eq!(value["backend"], "URL (Local First)");
    }

    #[test]
    fn backup_file_name_is_dated() {
        let now = Utc.with_ymd_and_hms(2025, 7, 9, 23, 59, 0).unwrap();
        let backup = Backup::of(&json!({"calc": {"a": 1}}), now).unwrap();
        assert_eq!(backup.file_name, "a-medias-backup-2025-07-09.json");
        assert!(backup.contents.contains("\n  \"calc\""));
    }
}

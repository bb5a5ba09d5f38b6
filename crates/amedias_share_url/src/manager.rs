//! Building and reading share links.

use crate::config::{
    ShareUrlConfig, PARAM_DATA, PARAM_HASH, PARAM_SHARE_ID, PARAM_SHARE_KEY, PARAM_VERSION,
    SHARE_PARAMS,
};
use crate::error::{ShareUrlError, ShareUrlResult};
use crate::location::Location;
use amedias_codec::{canonical_json, Fingerprint, StateCodec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use url::Url;

/// Allowance for parameter names and separators in size estimates.
const PARAM_OVERHEAD: usize = 100;

/// A freshly built share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedShareUrl {
    /// The full link.
    pub url: String,
    /// Link length in characters.
    pub size: usize,
    /// Whether the payload is compressed.
    pub compressed: bool,
}

/// Outcome of checking a link's fingerprint against its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrity {
    /// The fingerprint matches.
    Verified,
    /// The fingerprint does not match. The data is still returned.
    Mismatch,
    /// The link carries no fingerprint.
    Unchecked,
}

/// State read back from a share link.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedState {
    /// The decoded state.
    pub data: Value,
    /// Link format version, `"1"` when absent.
    pub version: String,
    /// Fingerprint check outcome.
    pub integrity: Integrity,
    /// Fingerprint of `data`.
    pub fingerprint: Fingerprint,
}

/// Pre-flight size report for a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeEstimate {
    /// Payload bytes after compression.
    pub compressed_bytes: usize,
    /// Payload characters after text encoding.
    pub encoded_chars: usize,
    /// Expected link length.
    pub estimated_url_length: usize,
    /// Whether the estimate fits the length limit.
    pub can_share: bool,
    /// Compressed size as a percentage of the raw JSON size.
    pub compression_ratio: f64,
}

/// Remote share credentials found in a legacy link.
#[derive(Clone, PartialEq, Eq)]
pub struct LegacyShare {
    /// Share id.
    pub share_id: String,
    /// Share secret.
    pub share_key: String,
}

impl std::fmt::Debug for LegacyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyShare")
            .field("share_id", &self.share_id)
            .field("share_key", &"[REDACTED]")
            .finish()
    }
}

/// Embeds state in links on the application's own address.
///
/// A link carries three query parameters: `d` (payload), `h` (fingerprint)
/// and `v` (format version). Everything else about the current address
/// except scheme, host and path is dropped from new links.
pub struct ShareUrlManager {
    config: ShareUrlConfig,
    codec: StateCodec,
    location: Arc<dyn Location>,
}

impl ShareUrlManager {
    /// Creates a manager.
    pub fn new(config: ShareUrlConfig, codec: StateCodec, location: Arc<dyn Location>) -> Self {
        Self {
            config,
            codec,
            location,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ShareUrlConfig {
        &self.config
    }

    /// Returns the location this manager reads and rewrites.
    pub fn location(&self) -> &Arc<dyn Location> {
        &self.location
    }

    /// The current address without query or fragment.
    pub fn base_address(&self) -> Url {
        let mut base = self.location.current();
        base.set_query(None);
        base.set_fragment(None);
        base
    }

    /// Builds a share link for `state`.
    ///
    /// # Errors
    ///
    /// - [`ShareUrlError::TooLarge`] if the link exceeds the limit
    /// - [`ShareUrlError::EncodeFailed`] if the state cannot be encoded
    pub fn create_share_url(&self, state: &Value) -> ShareUrlResult<CreatedShareUrl> {
        let encoded = self.codec.encode(state)?;
        let hash = Fingerprint::of(state);

        let mut url = self.base_address();
        url.query_pairs_mut()
            .append_pair(PARAM_DATA, &encoded.text)
            .append_pair(PARAM_HASH, hash.as_str())
            .append_pair(PARAM_VERSION, &self.config.format_version);

        let link = String::from(url);
        let size = link.len();
        if size > self.config.max_url_length {
            warn!(size, max = self.config.max_url_length, "share link too large");
            return Err(ShareUrlError::TooLarge {
                size,
                max_size: self.config.max_url_length,
            });
        }

        info!(size, compressed = encoded.compressed, "share link created");
        Ok(CreatedShareUrl {
            url: link,
            size,
            compressed: encoded.compressed,
        })
    }

    /// Reads the state embedded in `url`.
    ///
    /// A fingerprint mismatch is logged and reported in
    /// [`SharedState::integrity`]; the data is returned regardless.
    ///
    /// # Errors
    ///
    /// - [`ShareUrlError::NoData`] if the link has no payload
    /// - [`ShareUrlError::DecodeFailed`] if the link or payload is malformed
    pub fn read_share_url(&self, url: &str) -> ShareUrlResult<SharedState> {
        let parsed = Url::parse(url).map_err(ShareUrlError::decode)?;
        self.read_from(&parsed)
    }

    /// Reads the state embedded in the current address.
    ///
    /// # Errors
    ///
    /// See [`ShareUrlManager::read_share_url`].
    pub fn read_current(&self) -> ShareUrlResult<SharedState> {
        self.read_from(&self.location.current())
    }

    fn read_from(&self, url: &Url) -> ShareUrlResult<SharedState> {
        let payload = query_value(url, PARAM_DATA)
            .filter(|d| !d.is_empty())
            .ok_or(ShareUrlError::NoData)?;
        let hash = query_value(url, PARAM_HASH).filter(|h| !h.is_empty());
        let version = query_value(url, PARAM_VERSION)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.config.format_version.clone());

        let data = self.codec.decode(&payload).map_err(|e| {
            warn!(error = %e, "share link payload unreadable");
            ShareUrlError::from(e)
        })?;
        let fingerprint = Fingerprint::of(&data);

        let integrity = match hash {
            None => Integrity::Unchecked,
            Some(expected) if expected == fingerprint.as_str() => Integrity::Verified,
            Some(expected) => {
                warn!(
                    expected = %expected,
                    actual = %fingerprint,
                    "share link fingerprint mismatch, data may be corrupted"
                );
                Integrity::Mismatch
            }
        };

        debug!(version = %version, ?integrity, "share link read");
        Ok(SharedState {
            data,
            version,
            integrity,
            fingerprint,
        })
    }

    /// Returns true if the current address carries a payload.
    pub fn has_shared_data(&self) -> bool {
        query_value(&self.location.current(), PARAM_DATA).is_some()
    }

    /// Returns true if `url` carries a payload. Malformed URLs carry none.
    pub fn has_shared_data_in(url: &str) -> bool {
        Url::parse(url)
            .map(|u| query_value(&u, PARAM_DATA).is_some())
            .unwrap_or(false)
    }

    /// Returns the legacy remote credentials in the current address, if both
    /// halves are present.
    pub fn legacy_share(&self) -> Option<LegacyShare> {
        let current = self.location.current();
        let share_id = query_value(&current, PARAM_SHARE_ID).filter(|s| !s.is_empty())?;
        let share_key = query_value(&current, PARAM_SHARE_KEY).filter(|s| !s.is_empty())?;
        Some(LegacyShare {
            share_id,
            share_key,
        })
    }

    /// Removes share parameters from the current address without navigating.
    ///
    /// Unrelated query parameters are kept.
    pub fn clear_share_params(&self) {
        let mut url = self.location.current();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| !SHARE_PARAMS.contains(&name.as_ref()))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        if url != self.location.current() {
            debug!("share parameters cleared from address");
            self.location.replace(url);
        }
    }

    /// Estimates the link length for `state` without building it.
    ///
    /// # Errors
    ///
    /// [`ShareUrlError::EncodeFailed`] if the state cannot be encoded.
    pub fn estimate_size(&self, state: &Value) -> ShareUrlResult<SizeEstimate> {
        let encoded = self.codec.encode(state)?;
        let raw_len = canonical_json(state).len();
        let estimated_url_length =
            self.base_address().as_str().len() + encoded.text.len() + PARAM_OVERHEAD;

        let compression_ratio = if raw_len == 0 {
            100.0
        } else {
            encoded.packed_len as f64 / raw_len as f64 * 100.0
        };

        Ok(SizeEstimate {
            compressed_bytes: encoded.packed_len,
            encoded_chars: encoded.text.len(),
            estimated_url_length,
            can_share: estimated_url_length <= self.config.max_url_length,
            compression_ratio,
        })
    }

    /// Returns a reference to a QR image of `link` on the external endpoint.
    ///
    /// No image is produced locally.
    pub fn generate_qr_code(&self, link: &str, size: Option<u32>) -> String {
        let size = size.unwrap_or(self.config.default_qr_size);
        let data: String = form_urlencoded::byte_serialize(link.as_bytes()).collect();
        format!(
            "{}?size={}x{}&data={}",
            self.config.qr_endpoint, size, size, data
        )
    }
}

impl std::fmt::Debug for ShareUrlManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareUrlManager")
            .field("config", &self.config)
            .field("codec", &self.codec)
            .finish()
    }
}

fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

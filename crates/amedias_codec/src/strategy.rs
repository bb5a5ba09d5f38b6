//! Compression strategies and the platform capability probe.

use crate::error::{CodecError, CodecResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::debug;

/// First two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A byte transform applied to serialized state.
///
/// Two implementations exist: [`GzipStrategy`] and [`PassThroughStrategy`].
/// Their outputs are distinguishable by content alone (gzip output always
/// starts with [`GZIP_MAGIC`], JSON text never does), so a decoder can pick
/// the matching strategy without a format flag.
pub trait CompressionStrategy: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Transforms raw bytes for transport.
    fn compress(&self, raw: &[u8]) -> CodecResult<Vec<u8>>;

    /// Inverts [`CompressionStrategy::compress`].
    fn decompress(&self, encoded: &[u8]) -> CodecResult<Vec<u8>>;

    /// Returns true if `encoded` looks like this strategy's output.
    fn recognizes(&self, encoded: &[u8]) -> bool;
}

/// Gzip compression via `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipStrategy {
    level: Compression,
}

impl GzipStrategy {
    /// Creates a gzip strategy with the default level.
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Sets the compression level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }
}

impl Default for GzipStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionStrategy for GzipStrategy {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, raw: &[u8]) -> CodecResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder
            .write_all(raw)
            .map_err(|e| CodecError::encoding_failed(format!("gzip write: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| CodecError::encoding_failed(format!("gzip finish: {}", e)))
    }

    fn decompress(&self, encoded: &[u8]) -> CodecResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(encoded);
        let mut raw = Vec::with_capacity(encoded.len() * 4);
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| CodecError::decoding_failed(format!("gzip: {}", e)))?;
        Ok(raw)
    }

    fn recognizes(&self, encoded: &[u8]) -> bool {
        encoded.starts_with(&GZIP_MAGIC)
    }
}

/// Identity transform: bytes travel as plain UTF-8 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughStrategy;

impl CompressionStrategy for PassThroughStrategy {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress(&self, raw: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress(&self, encoded: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(encoded.to_vec())
    }

    fn recognizes(&self, encoded: &[u8]) -> bool {
        !encoded.starts_with(&GZIP_MAGIC)
    }
}

/// Optional platform features the codec can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether gzip compression works on this platform.
    pub compression: bool,
}

impl Capabilities {
    /// Checks which optional features actually work.
    ///
    /// Compression is considered available only if a sample survives a gzip
    /// round trip.
    pub fn probe() -> Self {
        const SAMPLE: &[u8] = br#"{"probe":[1,1,1,1,1,1,1,1]}"#;

        let gzip = GzipStrategy::new();
        let compression = gzip
            .compress(SAMPLE)
            .and_then(|encoded| gzip.decompress(&encoded))
            .map(|decoded| decoded == SAMPLE)
            .unwrap_or(false);

        debug!(compression, "codec capabilities probed");
        Self { compression }
    }

    /// Capabilities with every optional feature turned off.
    pub fn none() -> Self {
        Self { compression: false }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::probe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_output_starts_with_magic() {
        let encoded = GzipStrategy::new().compress(b"{}").unwrap();
        assert!(encoded.starts_with(&GZIP_MAGIC));
        assert!(GzipStrategy::new().recognizes(&encoded));
        assert!(!PassThroughStrategy.recognizes(&encoded));
    }

    #[test]
    fn gzip_compresses_repetitive_json() {
        let raw = br#"{"reimbursements":[0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0]}"#;
        let encoded = GzipStrategy::new().with_level(9).compress(raw).unwrap();
        assert!(encoded.len() < raw.len());
        assert_eq!(GzipStrategy::new().decompress(&encoded).unwrap(), raw.to_vec());
    }

    #[test]
    fn gzip_rejects_garbage() {
        let result = GzipStrategy::new().decompress(&[0x1f, 0x8b, 0x00, 0x01]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn passthrough_is_identity() {
        let raw = br#"{"calc":{}}"#;
        let strategy = PassThroughStrategy;
        assert_eq!(strategy.compress(raw).unwrap(), raw.to_vec());
        assert_eq!(strategy.decompress(raw).unwrap(), raw.to_vec());
        assert!(strategy.recognizes(raw));
    }

    #[test]
    fn probe_detects_gzip() {
        assert!(Capabilities::probe().compression);
        assert!(!Capabilities::none().compression);
    }
}

//! State codec: serialize, compress, and wrap as URL-safe text.

use crate::error::{CodecError, CodecResult};
use crate::fingerprint::canonical_json;
use crate::strategy::{Capabilities, CompressionStrategy, GzipStrategy, PassThroughStrategy};
use crate::text::{from_url_safe_text, to_url_safe_text};
use serde_json::Value;
use tracing::{debug, warn};

/// Output of [`StateCodec::compress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    /// Transformed bytes.
    pub bytes: Vec<u8>,
    /// Whether `bytes` is gzip output.
    pub compressed: bool,
    /// Length of the canonical JSON before compression.
    pub raw_len: usize,
}

/// Output of [`StateCodec::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// URL-safe text.
    pub text: String,
    /// Whether the underlying bytes are gzip output.
    pub compressed: bool,
    /// Length of the canonical JSON before compression.
    pub raw_len: usize,
    /// Length of the bytes before text encoding.
    pub packed_len: usize,
}

impl Encoded {
    /// Packed length divided by raw length.
    pub fn compression_ratio(&self) -> f64 {
        if self.raw_len == 0 {
            return 1.0;
        }
        self.packed_len as f64 / self.raw_len as f64
    }
}

/// Turns application state into compact URL-safe text and back.
///
/// Compression is used when the platform supports it and falls back to
/// plain JSON on any compression failure. Decoding picks the strategy from
/// the payload itself, so text produced under either strategy decodes under
/// any codec that can handle that strategy.
///
/// # Example
///
/// ```rust
/// use amedias_codec::StateCodec;
/// use serde_json::json;
///
/// let codec = StateCodec::probe();
/// let state = json!({"activeTab": "calc", "calc": {"nomina1": 1800}});
/// let encoded = codec.encode(&state).unwrap();
/// assert_eq!(codec.decode(&encoded.text).unwrap(), state);
/// ```
#[derive(Debug, Clone)]
pub struct StateCodec {
    gzip: Option<GzipStrategy>,
    plain: PassThroughStrategy,
}

impl StateCodec {
    /// Creates a codec using the given capabilities.
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            gzip: capabilities.compression.then(GzipStrategy::new),
            plain: PassThroughStrategy,
        }
    }

    /// Creates a codec after probing the platform.
    pub fn probe() -> Self {
        Self::new(Capabilities::probe())
    }

    /// Returns true if this codec compresses on encode.
    pub fn is_compressing(&self) -> bool {
        self.gzip.is_some()
    }

    /// Serializes and, when possible, compresses a state.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EncodingFailed`] only if even the plain
    /// strategy fails.
    pub fn compress(&self, state: &Value) -> CodecResult<Packed> {
        let json = canonical_json(state);
        let raw = json.as_bytes();

        if let Some(gzip) = &self.gzip {
            match gzip.compress(raw) {
                Ok(bytes) => {
                    debug!(raw = raw.len(), packed = bytes.len(), "state compressed");
                    return Ok(Packed {
                        bytes,
                        compressed: true,
                        raw_len: raw.len(),
                    });
                }
                Err(e) => warn!(error = %e, "compression failed, sending plain JSON"),
            }
        }

        Ok(Packed {
            bytes: self.plain.compress(raw)?,
            compressed: false,
            raw_len: raw.len(),
        })
    }

    /// Inverts [`StateCodec::compress`].
    ///
    /// # Errors
    ///
    /// - [`CodecError::CompressionUnavailable`] for gzip input on a codec
    ///   without compression
    /// - [`CodecError::DecodingFailed`] if the bytes are corrupt or not JSON
    /// - [`CodecError::InvalidUtf8`] if plain bytes are not UTF-8
    pub fn decompress(&self, bytes: &[u8]) -> CodecResult<Value> {
        let raw = self.strategy_for(bytes)?.decompress(bytes)?;
        let json = std::str::from_utf8(&raw).map_err(|_| CodecError::InvalidUtf8)?;
        serde_json::from_str(json)
            .map_err(|e| CodecError::decoding_failed(format!("json: {}", e)))
    }

    /// Compresses a state and encodes it as URL-safe text.
    ///
    /// # Errors
    ///
    /// See [`StateCodec::compress`].
    pub fn encode(&self, state: &Value) -> CodecResult<Encoded> {
        let packed = self.compress(state)?;
        Ok(Encoded {
            text: to_url_safe_text(&packed.bytes),
            compressed: packed.compressed,
            raw_len: packed.raw_len,
            packed_len: packed.bytes.len(),
        })
    }

    /// Inverts [`StateCodec::encode`].
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidText`] for malformed text, otherwise see
    /// [`StateCodec::decompress`].
    pub fn decode(&self, text: &str) -> CodecResult<Value> {
        let bytes = from_url_safe_text(text)?;
        self.decompress(&bytes)
    }

    fn strategy_for(&self, bytes: &[u8]) -> CodecResult<&dyn CompressionStrategy> {
        if self.plain.recognizes(bytes) {
            return Ok(&self.plain);
        }
        match &self.gzip {
            Some(gzip) => Ok(gzip),
            None => Err(CodecError::CompressionUnavailable),
        }
    }
}

impl Default for StateCodec {
    fn default() -> Self {
        Self::probe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::GZIP_MAGIC;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_state() -> Value {
        json!({
            "version": 2,
            "activeTab": "calc",
            "calc": {"nomina1": 1800, "nomina2": 1500, "gastos": 1200},
            "reimbursements": [
                {"id": 1, "concepto": "Super", "importe": 54.5, "pagadoPor": "A"},
                {"id": 2, "concepto": "Luz", "importe": 61.0, "pagadoPor": "B"}
            ],
            "timestamp": 1_700_000_000_000_u64
        })
    }

    #[test]
    fn compressing_codec_round_trip() {
        let codec = StateCodec::new(Capabilities { compression: true });
        let packed = codec.compress(&sample_state()).unwrap();

        assert!(packed.compressed);
        assert!(packed.bytes.starts_with(&GZIP_MAGIC));
        assert_eq!(codec.decompress(&packed.bytes).unwrap(), sample_state());
    }

    #[test]
    fn plain_codec_round_trip() {
        let codec = StateCodec::new(Capabilities::none());
        let packed = codec.compress(&sample_state()).unwrap();

        assert!(!packed.compressed);
        assert_eq!(packed.bytes, canonical_json(&sample_state()).into_bytes());
        assert_eq!(codec.decompress(&packed.bytes).unwrap(), sample_state());
    }

    #[test]
    fn compressing_codec_reads_plain_payloads() {
        let plain = StateCodec::new(Capabilities::none());
        let gzip = StateCodec::new(Capabilities { compression: true });

        let text = plain.encode(&sample_state()).unwrap().text;
        assert_eq!(gzip.decode(&text).unwrap(), sample_state());
    }

    #[test]
    fn plain_codec_rejects_gzip_payloads() {
        let plain = StateCodec::new(Capabilities::none());
        let gzip = StateCodec::new(Capabilities { compression: true });

        let text = gzip.encode(&sample_state()).unwrap().text;
        assert_eq!(plain.decode(&text), Err(CodecError::CompressionUnavailable));
    }

    #[test]
    fn decode_rejects_non_json() {
        let codec = StateCodec::probe();
        let text = to_url_safe_text(b"not json at all");
        assert!(matches!(
            codec.decode(&text),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let codec = StateCodec::probe();
        let text = to_url_safe_text(&[b'{', 0xff, 0xfe, b'}']);
        assert_eq!(codec.decode(&text), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn decode_rejects_truncated_gzip() {
        let codec = StateCodec::probe();
        let mut packed = codec.compress(&sample_state()).unwrap().bytes;
        packed.truncate(packed.len() / 2);
        assert!(matches!(
            codec.decompress(&packed),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = StateCodec::probe();
        let a = codec.encode(&sample_state()).unwrap();
        let b = codec.encode(&sample_state()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn compression_ratio_reported() {
        let codec = StateCodec::new(Capabilities { compression: true });
        let row = json!({"concepto": "Super", "importe": 10});
        let state = json!({"reimbursements": vec![row; 50]});
        let encoded = codec.encode(&state).unwrap();
        assert!(encoded.compression_ratio() < 0.5);
        assert_eq!(encoded.text.len(), crate::text::encoded_len(encoded.packed_len));
    }

    proptest! {
        #[test]
        fn arbitrary_states_round_trip(
            tab in "[a-zA-Z ]{0,12}",
            amounts in proptest::collection::vec(0i64..1_000_000, 0..20),
            compress in any::<bool>(),
        ) {
            let codec = StateCodec::new(Capabilities { compression: compress });
            let state = json!({"activeTab": tab, "amounts": amounts});
            let encoded = codec.encode(&state).unwrap();
            prop_assert_eq!(codec.decode(&encoded.text).unwrap(), state);
        }
    }
}

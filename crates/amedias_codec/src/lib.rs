//! # A Medias Codec
//!
//! Turns application state into compact, URL-safe text and back.
//!
//! The pipeline is `state -> canonical JSON -> gzip (optional) -> base64url`.
//! Decoding detects gzip by its magic bytes, so text written by a codec that
//! could not compress still decodes everywhere.
//!
//! ## Components
//!
//! - [`StateCodec`] - the encode/decode pipeline
//! - [`CompressionStrategy`] - gzip or pass-through byte transforms
//! - [`to_url_safe_text`] / [`from_url_safe_text`] - base64url without padding
//! - [`fingerprint`] - short change-detection digest of a state
//!
//! ## Example
//!
//! ```rust
//! use amedias_codec::{fingerprint, StateCodec};
//! use serde_json::json;
//!
//! let state = json!({"calc": {"nomina1": 1800}});
//! let codec = StateCodec::probe();
//! let text = codec.encode(&state).unwrap().text;
//!
//! let decoded = codec.decode(&text).unwrap();
//! assert_eq!(fingerprint(&decoded), fingerprint(&state));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod codec;
mod error;
mod fingerprint;
mod strategy;
mod text;

pub use codec::{Encoded, Packed, StateCodec};
pub use error::{CodecError, CodecResult};
pub use fingerprint::{canonical_json, fingerprint, Fingerprint};
pub use strategy::{
    Capabilities, CompressionStrategy, GzipStrategy, PassThroughStrategy, GZIP_MAGIC,
};
pub use text::{encoded_len, from_url_safe_text, to_url_safe_text};

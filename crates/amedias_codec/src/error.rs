//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to serialize or compress a state.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decompress or parse a state.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Text is not valid URL-safe base64.
    #[error("invalid base64url text: {message}")]
    InvalidText {
        /// Description of the text error.
        message: String,
    },

    /// Decoded bytes are not UTF-8.
    #[error("invalid UTF-8 payload")]
    InvalidUtf8,

    /// The payload is compressed but this codec cannot decompress.
    #[error("payload is compressed but compression is unavailable")]
    CompressionUnavailable,
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid text error.
    pub fn invalid_text(message: impl Into<String>) -> Self {
        Self::InvalidText {
            message: message.into(),
        }
    }

    /// Returns true if this error happened on the encode path.
    pub fn is_encode_error(&self) -> bool {
        matches!(self, CodecError::EncodingFailed { .. })
    }
}

//! Error types for share links.

use amedias_codec::CodecError;
use thiserror::Error;

/// Result type for share link operations.
pub type ShareUrlResult<T> = Result<T, ShareUrlError>;

/// Why a share link could not be built or read.
///
/// These are returned as values; nothing in this crate panics on bad input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShareUrlError {
    /// The finished link exceeds the length limit.
    #[error("share link too large: {size} > {max_size} characters")]
    TooLarge {
        /// Actual link length.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },

    /// The state could not be encoded.
    #[error("encode failed: {details}")]
    EncodeFailed {
        /// Underlying failure.
        details: String,
    },

    /// The link carries a payload that could not be decoded.
    #[error("decode failed: {details}")]
    DecodeFailed {
        /// Underlying failure.
        details: String,
    },

    /// The link carries no payload.
    #[error("no shared data in link")]
    NoData,
}

impl ShareUrlError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ShareUrlError::TooLarge { .. } => "too_large",
            ShareUrlError::EncodeFailed { .. } => "encode_failed",
            ShareUrlError::DecodeFailed { .. } => "decode_failed",
            ShareUrlError::NoData => "no_data",
        }
    }

    /// User-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            ShareUrlError::TooLarge { .. } => {
                "Los datos son demasiado grandes para compartir vía URL"
            }
            ShareUrlError::EncodeFailed { .. } => "Error al codificar los datos",
            ShareUrlError::DecodeFailed { .. } => "Error al decodificar los datos de la URL",
            ShareUrlError::NoData => "No hay datos en la URL",
        }
    }

    pub(crate) fn decode(details: impl std::fmt::Display) -> Self {
        Self::DecodeFailed {
            details: details.to_string(),
        }
    }
}

impl From<CodecError> for ShareUrlError {
    fn from(err: CodecError) -> Self {
        if err.is_encode_error() {
            Self::EncodeFailed {
                details: err.to_string(),
            }
        } else {
            Self::decode(err)
        }
    }
}

//! URL-safe binary-to-text encoding.

use crate::error::{CodecError, CodecResult};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// base64url without padding on output; accepts padded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes bytes with the base64url alphabet and no `=` padding.
pub fn to_url_safe_text(bytes: &[u8]) -> String {
    URL_SAFE_LENIENT.encode(bytes)
}

/// Decodes base64url text.
///
/// Surrounding whitespace and trailing padding are tolerated, and so are the
/// standard-alphabet symbols `+` and `/`.
///
/// # Errors
///
/// Returns [`CodecError::InvalidText`] if the text is not base64.
pub fn from_url_safe_text(text: &str) -> CodecResult<Vec<u8>> {
    let normalized: String = text
        .trim()
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_LENIENT
        .decode(normalized.as_bytes())
        .map_err(|e| CodecError::invalid_text(e.to_string()))
}

/// Number of characters [`to_url_safe_text`] produces for `len` bytes.
pub fn encoded_len(len: usize) -> usize {
    (len * 4).div_ceil(3)
}

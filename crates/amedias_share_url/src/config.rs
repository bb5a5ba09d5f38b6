//! Configuration for share links.

/// Query parameter carrying the encoded payload.
pub const PARAM_DATA: &str = "d";
/// Query parameter carrying the payload fingerprint.
pub const PARAM_HASH: &str = "h";
/// Query parameter carrying the link format version.
pub const PARAM_VERSION: &str = "v";
/// Legacy query parameter carrying a remote share id.
pub const PARAM_SHARE_ID: &str = "share";
/// Legacy query parameter carrying a remote share secret.
pub const PARAM_SHARE_KEY: &str = "key";

/// Every query parameter that belongs to a share link.
pub const SHARE_PARAMS: [&str; 5] = [
    PARAM_DATA,
    PARAM_HASH,
    PARAM_VERSION,
    PARAM_SHARE_ID,
    PARAM_SHARE_KEY,
];

/// Configuration for a [`crate::ShareUrlManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareUrlConfig {
    /// Longest link, in characters, that will be produced.
    pub max_url_length: usize,
    /// Value written to the version parameter.
    pub format_version: String,
    /// External QR rendering endpoint.
    pub qr_endpoint: String,
    /// QR side length in pixels when none is given.
    pub default_qr_size: u32,
}

impl ShareUrlConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            max_url_length: 8000,
            format_version: "1".to_string(),
            qr_endpoint: "https://api.qrserver.com/v1/create-qr-code/".to_string(),
            default_qr_size: 300,
        }
    }

    /// Sets the link length limit.
    pub fn with_max_url_length(mut self, max: usize) -> Self {
        self.max_url_length = max;
        self
    }

    /// Sets the QR endpoint.
    pub fn with_qr_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.qr_endpoint = endpoint.into();
        self
    }

    /// Sets the default QR size.
    pub fn with_default_qr_size(mut self, size: u32) -> Self {
        self.default_qr_size = size;
        self
    }
}

impl Default for ShareUrlConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ShareUrlConfig::default();
        assert_eq!(config.max_url_length, 8000);
        assert_eq!(config.format_version, "1");
        assert_eq!(config.default_qr_size, 300);
    }

    #[test]
    fn builder() {
        let config = ShareUrlConfig::new()
            .with_max_url_length(2000)
            .with_qr_endpoint("https://qr.example/")
            .with_default_qr_size(128);
        assert_eq!(config.max_url_length, 2000);
        assert_eq!(config.qr_endpoint, "https://qr.example/");
        assert_eq!(config.default_qr_size, 128);
    }
}

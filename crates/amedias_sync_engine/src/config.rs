//! Configuration for the sync engine.

use std::time::Duration;

/// Environment variable holding the backend address.
pub const ENV_BACKEND_URL: &str = "AMEDIAS_BACKEND_URL";
/// Environment variable holding the backend API key.
pub const ENV_API_KEY: &str = "AMEDIAS_API_KEY";
/// Environment variable holding the share table name.
pub const ENV_TABLE: &str = "AMEDIAS_TABLE";

/// Default share table name.
pub const DEFAULT_TABLE: &str = "a_medias_shares";

/// Where the remote backend lives.
///
/// Supplied at runtime, never compiled in.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    /// Backend base address, e.g. `https://project.supabase.co`.
    pub url: String,
    /// API key sent as both `apikey` and bearer credential.
    pub api_key: String,
    /// Table holding one row per share.
    pub table: String,
}

impl BackendConfig {
    /// Creates a backend configuration with the default table.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Reads the configuration from `AMEDIAS_BACKEND_URL`, `AMEDIAS_API_KEY`
    /// and `AMEDIAS_TABLE`. Missing variables leave the field empty.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let table = var(ENV_TABLE);
        Self {
            url: var(ENV_BACKEND_URL),
            api_key: var(ENV_API_KEY),
            table: if table.is_empty() {
                DEFAULT_TABLE.to_string()
            } else {
                table
            },
        }
    }

    /// Sets the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Returns true if both the address and the API key are set.
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

/// Configuration for sync timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Interval between background fetches while sharing.
    pub poll_interval: Duration,
    /// Quiet period before a queued push is sent.
    pub debounce: Duration,
    /// Retry behavior after transport failures.
    pub retry: RetryPolicy,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl SyncConfig {
    /// Creates the default sync configuration.
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(8000),
            debounce: Duration::from_millis(300),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the debounce period.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded exponential backoff.
///
/// The delay before retry `n` (0-indexed) is `min(base_delay * 2^n,
/// max_delay)`. No jitter: the schedule is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures that still get an automatic retry.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy with the default delays.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(30_000),
        }
    }

    /// Creates a policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculates the delay before retry `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(8000));
        assert_eq!(config.debounce, Duration::from_millis(300));
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_poll_interval(Duration::from_secs(1))
            .with_debounce(Duration::from_millis(50))
            .with_request_timeout(Duration::from_secs(5))
            .with_retry(RetryPolicy::no_retry());

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn retry_delay_sequence() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(16000));
    }

    #[test]
    fn retry_delay_respects_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(30_000));
    }

    #[test]
    fn backend_config_enabled_needs_both_fields() {
        assert!(BackendConfig::new("https://x.supabase.co", "anon").is_enabled());
        assert!(!BackendConfig::new("", "anon").is_enabled());
        assert!(!BackendConfig::new("https://x.supabase.co", " ").is_enabled());
        assert!(!BackendConfig::default().is_enabled());
    }

    #[test]
    fn backend_config_redacts_key() {
        let config = BackendConfig::new("https://x.supabase.co", "very-secret-key");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret-key"));
        assert!(debug.contains("a_medias_shares"));
    }
}

//! Share credentials.

use rand::distributions::Alphanumeric;
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a generated share id.
pub const SHARE_ID_LEN: usize = 16;
/// Length of a generated share secret.
pub const SHARE_SECRET_LEN: usize = 32;

/// Identifies one remote share: a discoverable id and a capability secret.
///
/// The secret is zeroized on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ShareCredentials {
    share_id: String,
    secret: String,
}

impl ShareCredentials {
    /// Wraps existing credentials.
    pub fn new(share_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            share_id: share_id.into(),
            secret: secret.into(),
        }
    }

    /// Generates fresh high-entropy credentials.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            share_id: random_token(SHARE_ID_LEN),
            secret: random_token(SHARE_SECRET_LEN),
        }
    }

    /// The share id. Safe to log.
    pub fn share_id(&self) -> &str {
        &self.share_id
    }

    /// The share secret.
    ///
    /// Don't log or persist the result.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for ShareCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareCredentials")
            .field("share_id", &self.share_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

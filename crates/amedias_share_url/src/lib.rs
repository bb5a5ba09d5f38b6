//! # A Medias Share URL
//!
//! Self-contained share links: the whole state travels inside the link, no
//! server involved.
//!
//! A link is the application's own address plus three query parameters:
//!
//! | Parameter | Content |
//! |-----------|---------|
//! | `d` | base64url payload (gzip when available) |
//! | `h` | fingerprint of the state |
//! | `v` | link format version |
//!
//! Links are capped at 8000 characters by default. Builders return
//! structured errors ([`ShareUrlError`]) instead of failing loudly, so the
//! caller decides how to tell the user.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod location;
mod manager;

pub use config::{
    ShareUrlConfig, PARAM_DATA, PARAM_HASH, PARAM_SHARE_ID, PARAM_SHARE_KEY, PARAM_VERSION,
    SHARE_PARAMS,
};
pub use error::{ShareUrlError, ShareUrlResult};
pub use location::{Location, MemoryLocation};
pub use manager::{
    CreatedShareUrl, Integrity, LegacyShare, ShareUrlManager, SharedState, SizeEstimate,
};

//! # Loto Common
//!
//! Shared plumbing for the loto generator crates.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Wall-clock timestamps for cached and persisted records

use std::time::{SystemTime, UNIX_EPOCH};

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Milliseconds since the Unix epoch.
///
/// A clock set before 1970 yields 0 rather than an error.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

//! # Loto Offline Worker
//!
//! The background worker that keeps the generator usable offline.
//!
//! ## Features
//!
//! - **Lifecycle**: install (pre-cache core assets), activate (prune stale versions)
//! - **Cache storage**: named, versioned buckets of request → response
//! - **Fetch routing**: network-first navigations with an offline page,
//!   cache-first core assets, network-first everything else
//! - **Clients**: open UI contexts, claimed on activation
//!
//! ## Architecture
//!
//! ```text
//! Registration
//!     └── active: OfflineWorker ── CacheConfig (version, core assets)
//!             │
//!             └── WorkerScope (shared by every worker version)
//!                     ├── CacheStorage
//!                     │       └── Cache "v1" ── request → CacheEntry
//!                     ├── Clients
//!                     └── events → WorkerEvent
//! ```

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod network;
pub mod registration;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStorage};
pub use config::{CacheConfig, CacheVersion};
pub use network::{
    FetchRequest, FetchResponse, HttpNetwork, Network, NetworkError, RequestMode, ResponseSource,
};
pub use registration::Registration;
pub use worker::{
    Client, Clients, OfflineWorker, Route, WorkerEvent, WorkerId, WorkerScope, WorkerState,
};

// ==================== Errors ====================

/// Errors from worker lifecycle operations.
///
/// Fetch handling never produces these; a failed fetch surfaces as the
/// [`NetworkError`] that caused it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceWorkerError {
    #[error("Install failed while caching {url}: {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("State error: {0}")]
    State(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid cache config: {0}")]
    InvalidConfig(String),
}

impl From<url::ParseError> for ServiceWorkerError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

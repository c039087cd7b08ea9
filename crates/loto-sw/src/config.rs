//! Per-deployment cache configuration.

use crate::ServiceWorkerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Name of the current cache bucket.
///
/// Bump it whenever the core asset list or its contents change; activation
/// then deletes every bucket with a different name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the worker caches and under which version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Current bucket name.
    pub version: CacheVersion,

    /// Origin the worker controls; core asset paths resolve against it.
    pub origin: Url,

    /// Paths that must be available offline.
    pub core_assets: Vec<String>,

    /// Page served when a navigation fails. Must be a core asset.
    pub offline_page: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: CacheVersion::new("v1"),
            origin: Url::parse("http://localhost/").expect("static origin parses"),
            core_assets: [
                "/",
                "/offline.html",
                "/icons/icon-192.png",
                "/icons/icon-512.png",
                "/manifest.webmanifest",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            offline_page: "/offline.html".to_string(),
        }
    }
}

impl CacheConfig {
    /// Config for `origin` with the default asset list.
    pub fn new(version: impl Into<String>, origin: Url) -> Self {
        Self {
            version: CacheVersion::new(version),
            origin,
            ..Default::default()
        }
    }

    /// Replace the core asset list.
    pub fn with_core_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> Result<(), ServiceWorkerError> {
        if self.version.as_str().is_empty() {
            return Err(ServiceWorkerError::InvalidConfig(
                "version must not be empty".to_string(),
            ));
        }
        if !self.core_assets.iter().any(|p| *p == self.offline_page) {
            return Err(ServiceWorkerError::InvalidConfig(format!(
                "offline page {} is not a core asset",
                self.offline_page
            )));
        }
        Ok(())
    }

    /// Resolve a path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        Ok(self.origin.join(path)?)
    }

    /// Absolute URLs of all core assets.
    pub fn core_urls(&self) -> Result<Vec<Url>, ServiceWorkerError> {
        self.core_assets.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the offline page.
    pub fn offline_url(&self) -> Result<Url, ServiceWorkerError> {
        self.resolve(&self.offline_page)
    }

    /// Whether `url` is one of the core assets of this origin.
    pub fn is_core_asset(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin() && self.core_assets.iter().any(|p| p == url.path())
    }
}

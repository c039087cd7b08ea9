//! Key-value store backends.

use crate::StorageError;
use async_trait::async_trait;
use hashbrown::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// String-keyed storage of serialized text.
///
/// Implementors provide the fallible `try_*` methods. Callers that only need
/// "value or nothing" semantics use [`get`](Self::get) and [`set`](Self::set),
/// which never fail: errors are logged and reported as absent / `false`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`.
    async fn try_get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn try_set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Returns whether a value was present.
    async fn try_remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Read `key`, treating every failure as absent.
    async fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Storage read failed");
                None
            }
        }
    }

    /// Write `key`, reporting failure as `false`.
    async fn set(&self, key: &str, value: &str) -> bool {
        match self.try_set(key, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Storage write failed");
                false
            }
        }
    }

    /// Remove `key`, reporting failure as `false`.
    async fn remove(&self, key: &str) -> bool {
        match self.try_remove(key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(key, error = %e, "Storage remove failed");
                false
            }
        }
    }
}

// ==================== MemoryStore ====================

/// In-process store, optionally capacity limited.
///
/// The quota counts key and value bytes, the way browser storage quotas do.
/// Availability can be switched off to model a store that has not been
/// initialized in the current environment.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an unlimited store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: None,
            available: AtomicBool::new(true),
        }
    }

    /// Create a store that rejects writes beyond `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new()
        }
    }

    /// Toggle availability. An unavailable store fails every operation.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Insert a value directly, bypassing quota and availability.
    pub async fn raw_insert(&self, key: &str, value: &str) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn try_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn try_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut entries = self.entries.write().await;

        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn try_remove(&self, key: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

// ==================== FileStore ====================

/// Directory-backed store: one file per key.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file store");
        Ok(Self { root })
    }

    /// Platform data directory for the generator's storage.
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("loto-generator").join("storage"))
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", encode_key(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn try_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(StorageError::Serialization(format!("{key}: {e}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn try_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn try_remove(&self, key: &str) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a key onto a portable file stem. Path separators are escaped, so a
/// key can never leave the store root.
fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

//! Persisted state cells.

use crate::queue::{PendingWrite, WriteQueue};
use crate::store::KeyValueStore;
use crate::{Storage, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use tracing::{debug, warn};

/// Why a cell started from its default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultReason {
    /// Nothing stored under the key.
    Absent,
    /// A stored value exists but does not parse as the cell's type.
    Corrupted(String),
    /// The store could not be read.
    Unavailable(String),
}

/// How a cell obtained its initial value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hydration {
    Loaded,
    Defaulted(DefaultReason),
}

impl Hydration {
    /// Whether the value came from the store.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Hydration::Loaded)
    }
}

/// Read and decode `key`. `Err` carries the reason to fall back to a default.
pub async fn hydrate<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<T, DefaultReason> {
    let raw = match store.try_get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Err(DefaultReason::Absent),
        Err(StorageError::Serialization(msg)) => return Err(DefaultReason::Corrupted(msg)),
        Err(e) => return Err(DefaultReason::Unavailable(e.to_string())),
    };
    serde_json::from_str(&raw).map_err(|e| DefaultReason::Corrupted(e.to_string()))
}

/// A replacement value or a function of the previous one.
pub enum Update<T> {
    Replace(T),
    With(Box<dyn FnOnce(&T) -> T + Send>),
}

impl<T> Update<T> {
    fn apply(self, previous: &T) -> T {
        match self {
            Update::Replace(value) => value,
            Update::With(f) => f(previous),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Update::With(_) => f.write_str("With(..)"),
        }
    }
}

/// One value bound to one store key.
///
/// The in-memory value is authoritative. Each write queues one persistence
/// attempt; if that attempt fails the change survives only until reload.
pub struct PersistedCell<T> {
    key: String,
    value: T,
    default: T,
    hydration: Hydration,
    queue: WriteQueue,
}

impl<T> PersistedCell<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Hydrate from `storage`, falling back to `default` on any failure.
    pub async fn create(storage: &Storage, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        let (value, hydration) = match hydrate(storage.store(), &key).await {
            Ok(value) => (value, Hydration::Loaded),
            Err(reason) => {
                match reason {
                    DefaultReason::Absent => debug!(%key, "No stored value, using default"),
                    ref other => warn!(%key, reason = ?other, "Stored value unusable, using default"),
                }
                (default.clone(), Hydration::Defaulted(reason))
            }
        };

        Self {
            key,
            value,
            default,
            hydration,
            queue: storage.queue().clone(),
        }
    }

    /// Current value.
    pub fn read(&self) -> &T {
        &self.value
    }

    /// The store key this cell owns.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// How the initial value was obtained.
    pub fn hydration(&self) -> &Hydration {
        &self.hydration
    }

    /// Apply `update` and queue its persistence.
    pub fn write(&mut self, update: Update<T>) -> PendingWrite {
        self.value = update.apply(&self.value);
        self.persist()
    }

    /// Replace the value.
    pub fn set(&mut self, value: T) -> PendingWrite {
        self.write(Update::Replace(value))
    }

    /// Derive the new value from the previous one.
    pub fn update(&mut self, f: impl FnOnce(&T) -> T + Send + 'static) -> PendingWrite {
        self.write(Update::With(Box::new(f)))
    }

    /// Go back to the default and delete the stored value, so the next
    /// hydration sees the key as absent.
    pub fn reset(&mut self) -> PendingWrite {
        self.value = self.default.clone();
        self.queue.submit_remove(&self.key)
    }

    fn persist(&self) -> PendingWrite {
        match serde_json::to_string(&self.value) {
            Ok(raw) => self.queue.submit(&self.key, raw),
            Err(e) => {
                let err = StorageError::from(e);
                warn!(key = %self.key, error = %err, "Value not persisted");
                PendingWrite::settled_with(false)
            }
        }
    }
}

impl<T> Deref for PersistedCell<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedCell")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("hydration", &self.hydration)
            .finish()
    }
}

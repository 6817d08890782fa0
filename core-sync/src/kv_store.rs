//! # Key-Value Store
//!
//! Local-first key/value persistence. Values are stored as JSON through the
//! platform [`SettingsStore`]; writes flagged for sync are also appended to
//! the [`SyncQueue`] and replayed when connectivity allows.
//!
//! Keys starting with `__` are reserved for internal state.

use bridge_traits::storage::SettingsStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, instrument};

use crate::error::{Result, SyncError};
use crate::sync_queue::SyncQueue;

/// Prefix reserved for internal keys such as the sync queue itself.
pub const RESERVED_KEY_PREFIX: &str = "__";

const LOCK_TABLE_PRUNE_THRESHOLD: usize = 64;

/// Serializes operations on the same key while letting different keys
/// proceed concurrently.
#[derive(Default)]
struct KeyedLock {
    locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLock {
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock();
            if locks.len() > LOCK_TABLE_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        entry.lock_owned().await
    }
}

pub struct KeyValueStore {
    storage: Arc<dyn SettingsStore>,
    queue: Arc<SyncQueue>,
    key_locks: KeyedLock,
}

impl KeyValueStore {
    pub fn new(storage: Arc<dyn SettingsStore>, queue: Arc<SyncQueue>) -> Self {
        Self {
            storage,
            queue,
            key_locks: KeyedLock::default(),
        }
    }

    /// Persist `value` under `key`.
    ///
    /// The local write is durable when this returns. With `sync` set, the
    /// write is also queued for remote replay and a drain is started in the
    /// background if the device is online. Remote failures never surface
    /// here.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, sync: bool) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value, sync).await
    }

    #[instrument(skip(self, value))]
    pub async fn set_value(&self, key: &str, value: serde_json::Value, sync: bool) -> Result<()> {
        validate_key(key)?;
        let encoded = serde_json::to_string(&value)?;

        {
            let _guard = self.key_locks.lock(key).await;
            let previous = if sync {
                self.storage.get_string(key).await?
            } else {
                None
            };

            self.storage.set_string(key, &encoded).await?;
            debug!(bytes = encoded.len(), "Value stored locally");

            if sync {
                if let Err(e) = self.queue.enqueue(key, value).await {
                    self.restore(key, previous.as_deref()).await;
                    return Err(e);
                }
            }
        }

        if sync {
            self.queue.request_drain();
        }
        Ok(())
    }

    /// Read and decode the value under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_value(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>> {
        validate_key(key)?;
        let _guard = self.key_locks.lock(key).await;
        match self.storage.get_string(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Delete the local value. Queued operations for the key are untouched.
    #[instrument(skip(self))]
    pub async fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let _guard = self.key_locks.lock(key).await;
        self.storage.delete(key).await?;
        Ok(())
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.storage.has_key(key).await?)
    }

    pub fn sync_queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Put back the value a failed synced write replaced.
    async fn restore(&self, key: &str, previous: Option<&str>) {
        let result = match previous {
            Some(raw) => self.storage.set_string(key, raw).await,
            None => self.storage.delete(key).await,
        };
        if let Err(e) = result {
            error!(key, error = %e, "Failed to roll back local write after queue failure");
        }
    }
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("queue", &self.queue)
            .finish()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with(RESERVED_KEY_PREFIX) {
        return Err(SyncError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("profile").is_ok());
        assert!(validate_key("media.assets").is_ok());
        assert!(matches!(validate_key(""), Err(SyncError::InvalidKey(_))));
        assert!(matches!(
            validate_key("__sync_queue"),
            Err(SyncError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_keyed_lock_serializes_same_key() {
        let locks = KeyedLock::default();
        let first = locks.lock("a").await;

        let other_key = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("b")).await;
        assert!(other_key.is_ok());

        let same_key = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("a")).await;
        assert!(same_key.is_err());

        drop(first);
        let again = tokio::time::timeout(std::time::Duration::from_millis(50), locks.lock("a")).await;
        assert!(again.is_ok());
    }
}

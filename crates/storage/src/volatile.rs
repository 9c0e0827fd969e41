//! Volatile (in-process) cache tier.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Low-latency tier placed in front of durable storage.
///
/// A miss is `Ok(None)`. Deleting an absent key is `NotFound`, which the
/// blob cache tolerates.
#[async_trait]
pub trait VolatileTier: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    async fn set(&self, key: &str, data: Bytes) -> StorageResult<()>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    fn tier_name(&self) -> &'static str;
}

/// Bounded LRU of blob bytes keyed by full cache key.
pub struct LruTier {
    entries: Mutex<LruCache<String, Bytes>>,
}

impl LruTier {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Build with `capacity` entries; zero is rejected.
    pub fn with_capacity(capacity: usize) -> StorageResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            StorageError::Config("volatile tier capacity must be positive".to_string())
        })?;
        Ok(Self::new(capacity))
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, LruCache<String, Bytes>>> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Volatile("lru lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VolatileTier for LruTier {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.lock()?.put(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match self.lock()?.pop(key) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    fn tier_name(&self) -> &'static str {
        "lru"
    }
}

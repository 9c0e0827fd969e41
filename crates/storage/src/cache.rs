//! Two-tier blob cache.
//!
//! Reads try the volatile tier and fall back to durable storage; writes go
//! to durable storage first and only then to the volatile tier. The durable
//! tier is the source of truth, so a volatile failure never hides a durable
//! write that already happened from later readers.

use crate::error::StorageResult;
use crate::traits::ObjectStore;
use crate::volatile::VolatileTier;
use bundler_core::{BUNDLE_FOOTER_PREFIX, bundle_footer_name};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Durable store with an optional volatile tier in front of it.
#[derive(Clone)]
pub struct BlobCache {
    durable: Arc<dyn ObjectStore>,
    volatile: Option<Arc<dyn VolatileTier>>,
}

impl BlobCache {
    pub fn new(durable: Arc<dyn ObjectStore>, volatile: Option<Arc<dyn VolatileTier>>) -> Self {
        Self { durable, volatile }
    }

    /// Cache without a volatile tier.
    pub fn durable_only(durable: Arc<dyn ObjectStore>) -> Self {
        Self::new(durable, None)
    }

    pub fn durable(&self) -> &Arc<dyn ObjectStore> {
        &self.durable
    }

    pub fn has_volatile(&self) -> bool {
        self.volatile.is_some()
    }

    /// Read a blob by full key, populating the volatile tier on a miss.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        if let Some(volatile) = &self.volatile {
            if let Some(data) = volatile.get(key).await? {
                return Ok(data);
            }
            debug!(key, "volatile miss");
        }

        let data = self.durable.get(key).await?;
        if let Some(volatile) = &self.volatile {
            volatile.set(key, data.clone()).await?;
        }
        Ok(data)
    }

    /// Write a blob by full key.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn set(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.durable.put(key, data.clone()).await?;
        if let Some(volatile) = &self.volatile {
            volatile.set(key, data).await?;
        }
        Ok(())
    }

    /// Delete a blob by full key. A key already absent from the volatile tier
    /// is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.durable.delete(key).await?;
        if let Some(volatile) = &self.volatile {
            match volatile.delete(key).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// View of this cache scoped to one app namespace.
    pub fn namespace(&self, app_id: &str, submission_id: Option<&str>) -> NamespacedCache {
        NamespacedCache {
            cache: self.clone(),
            app_id: app_id.to_string(),
            submission_id: submission_id.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }
}

/// Blob cache view that prefixes keys with `app` or `app/submission`.
#[derive(Clone)]
pub struct NamespacedCache {
    cache: BlobCache,
    app_id: String,
    submission_id: Option<String>,
}

impl NamespacedCache {
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn submission_id(&self) -> Option<&str> {
        self.submission_id.as_deref()
    }

    /// Full key for a logical key (content hash or artifact name).
    pub fn prefixed(&self, key: &str) -> String {
        match &self.submission_id {
            Some(submission_id) => format!("{}/{}/{}", self.app_id, submission_id, key),
            None => format!("{}/{}", self.app_id, key),
        }
    }

    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.cache.get(&self.prefixed(key)).await
    }

    pub async fn set(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.cache.set(&self.prefixed(key), data).await
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.cache.delete(&self.prefixed(key)).await
    }

    /// Read the footer for `platform`, falling back to the legacy
    /// unsuffixed artifact.
    pub async fn get_bundle_footer(&self, platform: &str) -> StorageResult<Bytes> {
        match self.get(&bundle_footer_name(platform)).await {
            Ok(data) => Ok(data),
            Err(err) => {
                debug!(app_id = %self.app_id, platform, error = %err, "Falling back to legacy bundle footer");
                self.get(BUNDLE_FOOTER_PREFIX).await
            }
        }
    }

    /// Store an artifact under its well-known name.
    pub async fn set_bundle_footer(&self, name: &str, data: Bytes) -> StorageResult<()> {
        self.set(name, data).await
    }
}

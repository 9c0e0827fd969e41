//! Blob storage for the bundler.
//!
//! This crate provides:
//! - The `ObjectStore` trait with filesystem and S3-compatible backends
//! - A bounded retry decorator for durable operations
//! - An in-process LRU volatile tier
//! - `BlobCache`, which composes the two tiers, and its per-namespace view

pub mod backends;
pub mod cache;
pub mod error;
pub mod retry;
pub mod traits;
pub mod volatile;

pub use backends::{
    filesystem::FilesystemBackend,
    s3::{S3Backend, S3Settings},
};
pub use cache::{BlobCache, NamespacedCache};
pub use error::{StorageError, StorageResult};
pub use retry::{DEFAULT_ATTEMPTS, RetryingStore};
pub use traits::ObjectStore;
pub use volatile::{LruTier, VolatileTier};

use bundler_core::config::{CacheConfig, StorageConfig};
use std::sync::Arc;
use std::time::Duration;

/// Create the durable object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            create_bucket,
        } => {
            let backend = S3Backend::new(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                force_path_style: *force_path_style,
            })
            .await?;
            if *create_bucket {
                backend.ensure_bucket().await?;
            }
            Ok(Arc::new(backend))
        }
    }
}

/// Compose the blob cache: retries around the durable store, plus the
/// volatile tier when enabled.
pub fn build_cache(durable: Arc<dyn ObjectStore>, config: &CacheConfig) -> StorageResult<BlobCache> {
    config.validate().map_err(StorageError::Config)?;

    let durable: Arc<dyn ObjectStore> = Arc::new(RetryingStore::new(
        durable,
        config.retry_attempts,
        Duration::from_millis(config.retry_backoff_ms),
    ));
    let volatile: Option<Arc<dyn VolatileTier>> = if config.volatile_enabled {
        Some(Arc::new(LruTier::with_capacity(config.volatile_capacity)?))
    } else {
        None
    };
    Ok(BlobCache::new(durable, volatile))
}

//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Durable key/value object store.
///
/// Keys are forward-slash paths such as `app/submission/<hash>`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content. Missing objects are `NotFound`.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object, replacing any previous value.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete an object. Missing objects are `NotFound`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the name of this storage backend, for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and writable.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

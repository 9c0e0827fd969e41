//! Bounded retries for durable storage operations.

use crate::error::StorageResult;
use crate::traits::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Default attempts per operation, including the first.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Retries transient failures of an inner store a fixed number of times.
///
/// Final errors (`NotFound`, `InvalidKey`, `Config`, ...) are returned on
/// the first occurrence.
pub struct RetryingStore {
    inner: Arc<dyn ObjectStore>,
    attempts: u32,
    backoff: Duration,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    async fn run<T, F, Fut>(&self, op: &'static str, key: &str, f: F) -> StorageResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    warn!(
                        backend = self.inner.backend_name(),
                        op,
                        key,
                        attempt,
                        error = %err,
                        "Durable storage operation failed, retrying"
                    );
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl ObjectStore for RetryingStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.run("exists", key, || self.inner.exists(key)).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.run("get", key, || self.inner.get(key)).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.run("put", key, || self.inner.put(key, data.clone()))
            .await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.run("delete", key, || self.inner.delete(key)).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}

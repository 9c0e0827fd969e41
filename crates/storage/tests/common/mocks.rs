use async_trait::async_trait;
use bundler_storage::error::{StorageError, StorageResult};
use bundler_storage::traits::ObjectStore;
use bundler_storage::volatile::VolatileTier;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory durable store that counts calls per operation.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.contains(key))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// What a [`FlakyStore`] does on its failing calls.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum FailureMode {
    /// Fail with a transient I/O error.
    Transient,
    /// Fail with a final NotFound error.
    NotFound,
}

/// Store whose first `failures` calls fail, then delegates to memory.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    failures: usize,
    mode: FailureMode,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(failures: usize, mode: FailureMode) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failures,
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(match self.mode {
                FailureMode::Transient => StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    format!("simulated failure {call} for {key}"),
                )),
                FailureMode::NotFound => StorageError::NotFound(key.to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.check(key)?;
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.check(key)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check(key)?;
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check(key)?;
        self.inner.delete(key).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Volatile tier that records calls and can be told to fail writes.
#[derive(Default)]
pub struct RecordingVolatile {
    entries: Mutex<BTreeMap<String, Bytes>>,
    pub fail_sets: std::sync::atomic::AtomicBool,
    pub sets: AtomicUsize,
    pub hits: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingVolatile {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolatileTier for RecordingVolatile {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let found = self.entries.lock().unwrap().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    async fn set(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(StorageError::Volatile("simulated outage".to_string()));
        }
        self.entries.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn tier_name(&self) -> &'static str {
        "recording"
    }
}

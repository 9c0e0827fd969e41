//! Per-namespace advisory locks.
//!
//! Push and submit hold the development namespace lock of an app for the
//! whole read-modify-write sequence so that two writers never interleave.
//! Pulls do not lock and may observe a namespace mid-update.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type NamespaceKey = (String, Option<String>);

/// Registry of async mutexes keyed by `(app, submission)`.
#[derive(Clone, Default)]
pub struct NamespaceLocks {
    locks: Arc<Mutex<HashMap<NamespaceKey, Arc<AsyncMutex<()>>>>>,
}

/// Held lock. Dropping it releases the namespace.
pub struct NamespaceGuard {
    _guard: OwnedMutexGuard<()>,
}

impl NamespaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a namespace.
    pub async fn lock(&self, app_id: &str, submission_id: Option<&str>) -> NamespaceGuard {
        let key = (
            app_id.to_string(),
            submission_id.filter(|s| !s.is_empty()).map(str::to_string),
        );
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries nobody else holds are pruned as new ones are requested.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(key).or_default().clone()
        };
        NamespaceGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of namespaces currently tracked.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

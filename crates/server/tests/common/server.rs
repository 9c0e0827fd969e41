//! Server test utilities.

use super::storage::filesystem_store;
use bundler_core::config::{AppConfig, MetadataConfig, StorageConfig};
use bundler_metadata::{MetadataStore, SqliteStore};
use bundler_server::{AppState, create_router};
use bundler_storage::{BlobCache, NamespacedCache, build_cache};
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and testing-only modes.
    pub async fn new() -> Self {
        Self::build(|_| {}, |state| state).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        Self::build(modifier, |state| state).await
    }

    /// Create a test server whose state is adjusted after construction,
    /// e.g. to swap in a different footer builder or registry.
    pub async fn with_state<F>(modifier: F) -> Self
    where
        F: FnOnce(AppState) -> AppState,
    {
        Self::build(|_| {}, modifier).await
    }

    async fn build<C, S>(config_modifier: C, state_modifier: S) -> Self
    where
        C: FnOnce(&mut AppConfig),
        S: FnOnce(AppState) -> AppState,
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage = filesystem_store(temp_dir.path())
            .await
            .expect("Failed to create storage backend");

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem {
                path: temp_dir.path().join("storage"),
            },
            metadata: MetadataConfig::Sqlite { path: db_path },
            ..AppConfig::for_testing()
        };
        config_modifier(&mut config);

        let cache: BlobCache =
            build_cache(storage.clone(), &config.cache).expect("Failed to build blob cache");
        let state = AppState::new(config, storage, cache, metadata)
            .expect("Failed to create application state");
        let state = state_modifier(state);

        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Blob cache view for one namespace.
    pub fn namespace(&self, app_id: &str, submission_id: Option<&str>) -> NamespacedCache {
        self.state.namespace(app_id, submission_id)
    }

    /// Blob cache view that bypasses the volatile tier.
    pub fn durable_namespace(&self, app_id: &str, submission_id: Option<&str>) -> NamespacedCache {
        BlobCache::durable_only(self.state.storage.clone()).namespace(app_id, submission_id)
    }
}

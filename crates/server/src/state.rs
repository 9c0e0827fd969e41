//! Application state shared across handlers.

use crate::auth::{HandshakeVerifier, verifier_from_config};
use crate::error::{ApiError, ApiResult};
use crate::locks::NamespaceLocks;
use crate::notify::Notifier;
use crate::packager::{FooterBuilder, builder_from_config};
use crate::registry::{MetadataRegistry, registry_from_config};
use bundler_core::config::AppConfig;
use bundler_metadata::MetadataStore;
use bundler_storage::{BlobCache, NamespacedCache, ObjectStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Durable object store, without retries. Used for health checks.
    pub storage: Arc<dyn ObjectStore>,
    /// Two-tier blob cache over `storage`.
    pub cache: BlobCache,
    /// File directory.
    pub metadata: Arc<dyn MetadataStore>,
    pub verifier: Arc<dyn HandshakeVerifier>,
    pub builder: Arc<dyn FooterBuilder>,
    pub registry: Arc<dyn MetadataRegistry>,
    pub notifier: Notifier,
    pub locks: NamespaceLocks,
}

impl AppState {
    /// Create the application state from configuration.
    ///
    /// Spawns the notification worker, so it must run inside a Tokio runtime.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        cache: BlobCache,
        metadata: Arc<dyn MetadataStore>,
    ) -> ApiResult<Self> {
        for mode in config.insecure_modes() {
            tracing::warn!(mode, "Running with a testing-only mode enabled");
        }

        let verifier = verifier_from_config(&config.auth.mode).map_err(ApiError::Config)?;
        let builder = builder_from_config(&config.packager.mode);
        let registry = registry_from_config(&config.registry.mode)?;
        let (notifier, _worker) = Notifier::spawn(&config.notifications)?;

        tracing::info!(
            verifier = verifier.name(),
            builder = builder.name(),
            registry = registry.name(),
            volatile = cache.has_volatile(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            cache,
            metadata,
            verifier,
            builder,
            registry,
            notifier,
            locks: NamespaceLocks::new(),
        })
    }

    /// Replace the footer builder.
    pub fn with_builder(mut self, builder: Arc<dyn FooterBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// Replace the registry client.
    pub fn with_registry(mut self, registry: Arc<dyn MetadataRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Blob cache scoped to `(app, submission)`.
    pub fn namespace(&self, app_id: &str, submission_id: Option<&str>) -> NamespacedCache {
        self.cache.namespace(app_id, submission_id)
    }
}

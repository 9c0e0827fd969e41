//! Storage test utilities.

use bundler_storage::{FilesystemBackend, ObjectStore, StorageResult};
use std::path::Path;
use std::sync::Arc;

/// Filesystem object store rooted under a caller-owned directory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub async fn filesystem_store(root: &Path) -> StorageResult<Arc<dyn ObjectStore>> {
    let backend = FilesystemBackend::new(root.join("storage")).await?;
    Ok(Arc::new(backend))
}

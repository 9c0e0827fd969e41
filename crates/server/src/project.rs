//! Scratch project directories handed to the footer builder.

use crate::archive::UploadBundle;
use crate::error::ApiResult;
use bundler_core::validate_name;
use bundler_metadata::FileMap;
use bundler_storage::NamespacedCache;
use tempfile::TempDir;

/// Write every file of a namespace into a fresh temp directory.
///
/// Bytes come from the upload bundle when it carries the recorded hash for
/// a name, and from the blob cache otherwise. The directory is removed when
/// the returned handle is dropped.
pub async fn materialize(
    files: &FileMap,
    bundle: Option<&UploadBundle>,
    cache: &NamespacedCache,
) -> ApiResult<TempDir> {
    let dir = tempfile::Builder::new().prefix("project-path").tempdir()?;

    for (name, hash) in files {
        validate_name(name)?;

        let staged = bundle.filter(|b| b.hash(name) == Some(hash.as_str()) && b.has_content(name));
        let bytes = match staged {
            Some(bundle) => bundle.content(name)?,
            None => cache.get(hash).await?.to_vec(),
        };

        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
    }

    tracing::debug!(files = files.len(), dir = %dir.path().display(), "Materialized project");
    Ok(dir)
}

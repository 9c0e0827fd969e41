//! Push: apply a client listing to the development namespace.
//!
//! The response is a stream of `siphon: <msg>` lines. Once the first line
//! is out, failures are reported as a final `[ERROR] <msg>` line (or
//! `Internal error.`) instead of a status code.

use crate::archive::{Comparison, UploadBundle};
use crate::auth::{MALFORMED_TOKEN, VerifiedHandshake};
use crate::error::{ApiError, ApiResult};
use crate::handlers::blocking_failed;
use crate::icons::collect_icons;
use crate::metrics::{BLOBS_PROTECTED, record_files_applied, record_push};
use crate::packager::FooterPaths;
use crate::project::materialize;
use crate::registry::AppUpdate;
use crate::state::AppState;
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Extension, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use bundler_core::{ContentHash, MANIFEST_NAME, Manifest, bundle_footer_name};
use bundler_metadata::FileMap;
use bundler_storage::NamespacedCache;
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::mpsc;

const PROGRESS_BUFFER: usize = 64;

#[derive(Debug, Serialize)]
pub struct HashesResponse {
    pub hashes: FileMap,
}

/// GET /v1/push/{app_id}/
pub async fn get_hashes(
    State(state): State<AppState>,
    Extension(handshake): Extension<VerifiedHandshake>,
) -> ApiResult<Json<HashesResponse>> {
    let hashes = state.metadata.get_files(handshake.app_id(), None).await?;
    Ok(Json(HashesResponse { hashes }))
}

/// POST /v1/push/{app_id}/
pub async fn push(
    State(state): State<AppState>,
    Extension(handshake): Extension<VerifiedHandshake>,
    body: Body,
) -> ApiResult<Response> {
    let user_id = handshake
        .user_id()
        .ok_or_else(|| ApiError::Unauthorized(MALFORMED_TOKEN.to_string()))?
        .to_string();

    let payload = axum::body::to_bytes(body, state.config.server.max_body_bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read push payload: {e}")))?;

    let (tx, mut rx) = mpsc::channel::<String>(PROGRESS_BUFFER);
    tokio::spawn(async move {
        let progress = Progress { tx };
        let app_id = handshake.app_id().to_string();
        match run_push(&state, &handshake, &user_id, payload, &progress).await {
            Ok(outcome) => {
                tracing::info!(app_id, outcome = outcome.label(), "Push finished");
                record_push(outcome.label());
            }
            Err(err) => {
                if err.is_user_facing() {
                    tracing::warn!(app_id, error = %err, "Push rejected");
                } else {
                    tracing::error!(app_id, code = err.code(), error = %err, "Push failed");
                }
                record_push(err.outcome());
                progress.send(err.progress_line()).await;
            }
        }
    });

    let stream = async_stream::stream! {
        while let Some(line) = rx.recv().await {
            yield Ok::<_, Infallible>(Bytes::from(line));
        }
    };
    Ok((
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Writer for the streamed progress lines. A client that went away is ignored.
struct Progress {
    tx: mpsc::Sender<String>,
}

impl Progress {
    async fn line(&self, message: &str) {
        self.send(format!("siphon: {message}\n")).await;
    }

    async fn send(&self, raw: String) {
        if self.tx.send(raw).await.is_err() {
            tracing::debug!("Push client disconnected");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOutcome {
    NoChanges,
    Updated,
}

impl PushOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::NoChanges => "no_changes",
            Self::Updated => "updated",
        }
    }
}

async fn run_push(
    state: &AppState,
    handshake: &VerifiedHandshake,
    user_id: &str,
    payload: Bytes,
    progress: &Progress,
) -> ApiResult<PushOutcome> {
    let app_id = handshake.app_id();
    let cache = state.namespace(app_id, None);

    progress.line("Decompressing...").await;
    let bundle = tokio::task::spawn_blocking(move || UploadBundle::extract(&payload))
        .await
        .map_err(blocking_failed)??;

    let _guard = state.locks.lock(app_id, None).await;

    progress.line("Checking your Siphonfile...").await;
    let (manifest, manifest_dirty) = load_manifest(state, &bundle, &cache, app_id).await?;

    let files = state.metadata.get_files(app_id, None).await?;
    let comparison = bundle.compare(&files)?;
    apply(state, &bundle, &cache, app_id, &comparison, progress).await?;

    if comparison.is_empty() && !manifest_dirty {
        progress.line("No changes detected.").await;
        return Ok(PushOutcome::NoChanges);
    }

    progress.line("Building diffs...").await;
    let files = state.metadata.get_files(app_id, None).await?;
    let project = materialize(&files, Some(&bundle), &cache).await?;
    let icons = {
        let dir = project.path().to_path_buf();
        tokio::task::spawn_blocking(move || collect_icons(&dir, &files))
            .await
            .map_err(blocking_failed)??
    };

    let footers = state
        .builder
        .build(project.path(), &manifest.base_version)
        .await?;
    drop(project);

    let update = AppUpdate::new(&manifest, &icons)?;
    state.registry.put_app(app_id, &update, handshake).await?;

    store_footers(&cache, &footers).await?;
    drop(footers);
    progress.line("Done.").await;

    state.notifier.app_updated(app_id, user_id);
    Ok(PushOutcome::Updated)
}

/// Siphonfile from the bundle when it changed, else from the cache.
/// The flag is true when the bundle carried it.
async fn load_manifest(
    state: &AppState,
    bundle: &UploadBundle,
    cache: &NamespacedCache,
    app_id: &str,
) -> ApiResult<(Manifest, bool)> {
    let staged = bundle.manifest_bytes().map_err(|e| {
        tracing::warn!(app_id, error = %e, "Unreadable Siphonfile in archive");
        ApiError::User("Problem loading Siphonfile from the archive.".to_string())
    })?;

    let (bytes, dirty) = match staged {
        Some(bytes) => (bytes, true),
        None => {
            let from_cache = async {
                let hash = state.metadata.get_file(app_id, None, MANIFEST_NAME).await?;
                Ok::<_, ApiError>(cache.get(&hash).await?.to_vec())
            };
            let bytes = from_cache.await.map_err(|e| {
                tracing::warn!(app_id, error = %e, "Siphonfile missing from cache");
                ApiError::User("Problem loading Siphonfile from the cache.".to_string())
            })?;
            (bytes, false)
        }
    };

    Ok((Manifest::parse(&bytes)?, dirty))
}

async fn apply(
    state: &AppState,
    bundle: &UploadBundle,
    cache: &NamespacedCache,
    app_id: &str,
    comparison: &Comparison,
    progress: &Progress,
) -> ApiResult<()> {
    if !comparison.added.is_empty() {
        progress.line("Adding files...").await;
        store_files(state, bundle, cache, app_id, &comparison.added, true, progress).await?;
        record_files_applied("added", comparison.added.len());
    }
    if !comparison.changed.is_empty() {
        progress.line("Updating files...").await;
        store_files(state, bundle, cache, app_id, &comparison.changed, false, progress).await?;
        record_files_applied("changed", comparison.changed.len());
    }
    if !comparison.removed.is_empty() {
        progress.line("Removing deleted files...").await;
        remove_files(state, cache, app_id, &comparison.removed, progress).await?;
        record_files_applied("removed", comparison.removed.len());
    }
    Ok(())
}

/// Write uploaded bytes under their hash, then insert or update the row.
async fn store_files(
    state: &AppState,
    bundle: &UploadBundle,
    cache: &NamespacedCache,
    app_id: &str,
    names: &[String],
    add: bool,
    progress: &Progress,
) -> ApiResult<()> {
    for name in names {
        progress.line(&format!("--> {name}")).await;
        let hash = bundle
            .hash(name)
            .ok_or_else(|| ApiError::Internal(format!("Hash not found for name: {name}")))?;
        let bytes = bundle.content(name)?;
        if !ContentHash::matches(&bytes, hash) {
            tracing::warn!(app_id, name, hash, "Uploaded content does not match its listed hash");
        }

        cache.set(hash, Bytes::from(bytes)).await?;
        if add {
            state.metadata.add_file(app_id, None, name, hash).await?;
        } else {
            state.metadata.update_file(app_id, None, name, hash).await?;
        }
    }
    Ok(())
}

/// Drop each row, deleting its blob unless another name still uses the hash.
async fn remove_files(
    state: &AppState,
    cache: &NamespacedCache,
    app_id: &str,
    names: &[String],
    progress: &Progress,
) -> ApiResult<()> {
    for name in names {
        progress.line(&format!("--> {name}")).await;
        let files = state.metadata.get_files(app_id, None).await?;
        let hash = files
            .get(name)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ApiError::Internal(format!("No hash for file removal: {name}")))?;

        if is_shared(&files, name, hash) {
            BLOBS_PROTECTED.inc();
            tracing::debug!(app_id, name, hash = %hash, "Blob still referenced, keeping it");
        } else {
            match cache.delete(hash).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(app_id, name, hash = %hash, "Blob already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }
        state.metadata.delete_file(app_id, None, name).await?;
    }
    Ok(())
}

/// Whether a name other than `name` maps to `hash`.
fn is_shared(files: &FileMap, name: &str, hash: &str) -> bool {
    files.iter().any(|(other, h)| h == hash && other != name)
}

async fn store_footers(cache: &NamespacedCache, footers: &FooterPaths) -> ApiResult<()> {
    for (platform, path) in footers.iter() {
        let bytes = tokio::fs::read(path).await?;
        cache
            .set_bundle_footer(&bundle_footer_name(platform), Bytes::from(bytes))
            .await?;
    }
    Ok(())
}

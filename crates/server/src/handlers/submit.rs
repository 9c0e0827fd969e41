//! Submit: snapshot the development namespace under a new submission id.
//!
//! Blobs are copied and the footer is stored in the submission namespace
//! before any directory row is written, so a submission that shows up in
//! the directory always has its footer.

use crate::auth::VerifiedHandshake;
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_submit;
use crate::project::materialize;
use crate::state::AppState;
use axum::Form;
use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use bundler_core::{BUNDLE_FOOTER_PREFIX, MANIFEST_NAME, Manifest, bundle_footer_name};
use bundler_metadata::MetadataError;
use bundler_storage::NamespacedCache;
use serde::Deserialize;
use std::collections::BTreeSet;

const COPY_FAILED: &str = "Problem copying files for the snapshot";
const MANIFEST_FAILED: &str = "Problem loading Siphonfile from the cache.";
const FOOTER_FAILED: &str = "Problem building footer for platform.";
const SUBMISSION_EXISTS: &str = "Submission ID already exists.";

#[derive(Debug, Default, Deserialize)]
pub struct SubmitForm {
    #[serde(default)]
    pub submission_id: String,
    #[serde(default)]
    pub platform: String,
}

/// POST /v1/submit/{app_id}/
pub async fn submit(
    State(state): State<AppState>,
    Extension(handshake): Extension<VerifiedHandshake>,
    Form(form): Form<SubmitForm>,
) -> ApiResult<StatusCode> {
    let result = run_submit(&state, &handshake, form).await;
    record_submit(match &result {
        Ok(()) => "ok",
        Err(e) => e.outcome(),
    });
    result?;
    Ok(StatusCode::OK)
}

fn bad_request(message: &str) -> ApiError {
    ApiError::BadRequest(message.to_string())
}

fn step_failed(step: &'static str, message: &str) -> impl FnOnce(ApiError) -> ApiError {
    move |err| {
        tracing::error!(step, error = %err, "Submit step failed");
        ApiError::Failed(message.to_string())
    }
}

async fn run_submit(
    state: &AppState,
    handshake: &VerifiedHandshake,
    form: SubmitForm,
) -> ApiResult<()> {
    let app_id = handshake.app_id();
    let submission_id = form.submission_id.as_str();
    if app_id.is_empty() || submission_id.is_empty() {
        return Err(bad_request("App ID and submission ID are required."));
    }
    if state.metadata.submission_exists(submission_id).await? {
        return Err(bad_request(SUBMISSION_EXISTS));
    }
    if !state.metadata.app_exists(app_id).await? {
        return Err(bad_request("App ID does not exist."));
    }
    if handshake.submission_id() != Some(submission_id) {
        return Err(bad_request("Submission ID does not match the handshake."));
    }
    let platform = if form.platform.is_empty() {
        "ios"
    } else {
        form.platform.as_str()
    };

    let _guard = state.locks.lock(app_id, None).await;
    // A concurrent submit may have created the id while we waited.
    if state.metadata.submission_exists(submission_id).await? {
        return Err(bad_request(SUBMISSION_EXISTS));
    }
    let dev = state.namespace(app_id, None);
    let snapshot = state.namespace(app_id, Some(submission_id));

    let files = state.metadata.get_files(app_id, None).await?;
    copy_blobs(&dev, &snapshot, files.values())
        .await
        .map_err(step_failed("copy_files", COPY_FAILED))?;

    let manifest = load_manifest(state, &snapshot, app_id)
        .await
        .map_err(step_failed("load_manifest", MANIFEST_FAILED))?;
    let manifest = Manifest::parse(&manifest)?;

    build_footer(state, &dev, &snapshot, &files, &manifest, platform).await?;

    match state.metadata.snapshot(app_id, submission_id).await {
        Ok(rows) => {
            tracing::info!(app_id, submission_id, platform, rows, "Submission created");
            Ok(())
        }
        Err(MetadataError::AlreadyExists(_)) => Err(bad_request(SUBMISSION_EXISTS)),
        Err(e) => Err(e.into()),
    }
}

/// Copy each distinct blob from the development namespace into the snapshot.
async fn copy_blobs<'a>(
    dev: &NamespacedCache,
    snapshot: &NamespacedCache,
    hashes: impl Iterator<Item = &'a String>,
) -> ApiResult<()> {
    let hashes: BTreeSet<&String> = hashes.collect();
    for hash in hashes {
        let bytes = dev.get(hash).await?;
        snapshot.set(hash, bytes).await?;
    }
    Ok(())
}

/// Siphonfile bytes, looked up by the development row's hash in the snapshot namespace.
async fn load_manifest(
    state: &AppState,
    snapshot: &NamespacedCache,
    app_id: &str,
) -> ApiResult<Vec<u8>> {
    let hash = state.metadata.get_file(app_id, None, MANIFEST_NAME).await?;
    Ok(snapshot.get(&hash).await?.to_vec())
}

/// Rebuild the footer from the development files and store the requested
/// platform's footer in the snapshot namespace.
///
/// The android footer is stored under the legacy unsuffixed name.
async fn build_footer(
    state: &AppState,
    dev: &NamespacedCache,
    snapshot: &NamespacedCache,
    files: &bundler_metadata::FileMap,
    manifest: &Manifest,
    platform: &str,
) -> ApiResult<()> {
    let project = materialize(files, None, dev).await?;
    let footers = state
        .builder
        .build(project.path(), &manifest.base_version)
        .await?;
    drop(project);

    let name = match platform {
        "ios" => bundle_footer_name("ios"),
        "android" => BUNDLE_FOOTER_PREFIX.to_string(),
        _ => return Err(ApiError::Failed(FOOTER_FAILED.to_string())),
    };
    let path = footers
        .for_platform(platform)
        .ok_or_else(|| ApiError::Failed(FOOTER_FAILED.to_string()))?;

    let bytes = tokio::fs::read(path).await?;
    snapshot.set_bundle_footer(&name, Bytes::from(bytes)).await?;
    Ok(())
}

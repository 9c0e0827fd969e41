//! Pull: send the assets a client is missing plus the current footer.

use crate::auth::VerifiedHandshake;
use crate::error::{ApiError, ApiResult};
use crate::handlers::blocking_failed;
use crate::metrics::record_pull;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use bundler_core::BUNDLE_FOOTER_PREFIX;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

pub const ASSETS_LISTING: &str = "assets-listing";
pub const ASSETS_DIR: &str = "__siphon_assets";

const DEFAULT_PLATFORM: &str = "ios";

#[derive(Debug, Default, Deserialize)]
pub struct PullQuery {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub submission_id: String,
}

#[derive(Debug, Deserialize)]
struct PullPayload {
    asset_hashes: Option<BTreeMap<String, String>>,
}

/// Asset path as the client sees it.
fn client_path(name: &str) -> String {
    format!("images/{name}")
}

/// POST /v1/pull/{app_id}/
pub async fn pull(
    State(state): State<AppState>,
    Extension(handshake): Extension<VerifiedHandshake>,
    Query(query): Query<PullQuery>,
    body: Bytes,
) -> ApiResult<Response> {
    let result = build_pull(&state, &handshake, query, &body).await;
    record_pull(match &result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    });
    let archive = result?;
    Ok(([(CONTENT_TYPE, "application/zip")], archive).into_response())
}

async fn build_pull(
    state: &AppState,
    handshake: &VerifiedHandshake,
    query: PullQuery,
    body: &[u8],
) -> ApiResult<Vec<u8>> {
    let asset_hashes = serde_json::from_slice::<PullPayload>(body)
        .ok()
        .and_then(|p| p.asset_hashes)
        .ok_or_else(|| ApiError::BadRequest("Malformed payload.".to_string()))?;

    let submission_id = Some(query.submission_id.as_str()).filter(|s| !s.is_empty());
    if submission_id.is_some() && submission_id != handshake.submission_id() {
        return Err(ApiError::Unauthorized(
            "Submission ID does not match the handshake.".to_string(),
        ));
    }
    let platform = if query.platform.is_empty() {
        DEFAULT_PLATFORM
    } else {
        query.platform.as_str()
    };

    let app_id = handshake.app_id();
    let files = state.metadata.get_files(app_id, submission_id).await?;
    if files.is_empty() {
        return Err(ApiError::BadRequest(
            "This app has not been pushed yet.".to_string(),
        ));
    }

    let cache = state.namespace(app_id, submission_id);
    let assets = state.metadata.get_asset_files(app_id, submission_id).await?;

    let listing: String = assets
        .keys()
        .map(|name| format!("{}\n", client_path(name)))
        .collect();

    let mut changed = Vec::new();
    for (name, hash) in &assets {
        let path = client_path(name);
        if asset_hashes.get(&path) != Some(hash) {
            let bytes = cache.get(hash).await?;
            changed.push((format!("{ASSETS_DIR}/{path}"), bytes));
        }
    }

    let footer = cache.get_bundle_footer(platform).await?;
    tracing::info!(
        app_id,
        submission_id = submission_id.unwrap_or(""),
        platform,
        assets = assets.len(),
        sent = changed.len(),
        "Pull prepared"
    );

    tokio::task::spawn_blocking(move || write_archive(listing.as_bytes(), &changed, &footer))
        .await
        .map_err(blocking_failed)?
}

fn write_archive(listing: &[u8], assets: &[(String, Bytes)], footer: &[u8]) -> ApiResult<Vec<u8>> {
    let zip_err = |e: zip::result::ZipError| ApiError::Internal(format!("failed to write pull archive: {e}"));
    let options = SimpleFileOptions::default();
    let mut zw = zip::ZipWriter::new(Cursor::new(Vec::new()));

    zw.start_file(ASSETS_LISTING, options).map_err(zip_err)?;
    zw.write_all(listing)?;
    for (path, bytes) in assets {
        zw.start_file(path.as_str(), options).map_err(zip_err)?;
        zw.write_all(bytes)?;
    }
    zw.start_file(BUNDLE_FOOTER_PREFIX, options).map_err(zip_err)?;
    zw.write_all(footer)?;

    Ok(zw.finish().map_err(zip_err)?.into_inner())
}

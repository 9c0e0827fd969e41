//! Dependency healthcheck for uptime probes.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// Namespace holding the round-trip probe blob.
pub const HEALTHCHECK_NAMESPACE: &str = "_healthcheck";

const PROBE_KEY: &str = "probe";
const PROBE_BYTES: &[u8] = b"bundler healthcheck probe";

/// GET /v1/healthcheck/
pub async fn healthcheck(State(state): State<AppState>) -> Response {
    let (status, body) = match run_checks(&state).await {
        Ok(()) => (StatusCode::OK, "Passed.".to_string()),
        Err(failure) => {
            tracing::warn!(failure = %failure, "Healthcheck failed");
            (StatusCode::SERVICE_UNAVAILABLE, failure)
        }
    };
    (status, [(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

async fn run_checks(state: &AppState) -> Result<(), String> {
    state
        .metadata
        .health_check()
        .await
        .map_err(|e| format!("Metadata error: {e}"))?;

    state
        .storage
        .health_check()
        .await
        .map_err(|e| format!("Storage error: {e}"))?;

    if let Some(app_id) = &state.config.healthcheck.probe_app_id {
        let files = state
            .metadata
            .get_files(app_id, None)
            .await
            .map_err(|e| format!("Hashes error: {e}"))?;
        if files.is_empty() {
            return Err("Hashes error: zero found".to_string());
        }
    }

    let cache = state.namespace(HEALTHCHECK_NAMESPACE, None);
    cache
        .set(PROBE_KEY, Bytes::from_static(PROBE_BYTES))
        .await
        .map_err(|e| format!("Cache set error: {e}"))?;
    let read = cache
        .get(PROBE_KEY)
        .await
        .map_err(|e| format!("Cache get error: {e}"))?;
    if read.len() != PROBE_BYTES.len() {
        return Err("Cache get error: lengths do not match".to_string());
    }
    Ok(())
}

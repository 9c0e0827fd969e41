//! Request tracing and handshake verification middleware.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, Query, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use bundler_core::config::AuthMode;
use bundler_core::{Handshake, Identity};
use ed25519_dalek::{Signature, VerifyingKey};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

pub const INVALID_TOKEN: &str = "Missing or invalid handshake_token.";
pub const UNAUTHORIZED_ACTION: &str = "Unauthorized action for this endpoint.";
pub const MISSING_ACTION: &str = "Missing action.";
pub const MALFORMED_TOKEN: &str = "Malformed handshake_token.";
pub const TOKEN_MISMATCH: &str = "The handshake_token does not match.";

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value.
    /// The value is truncated to MAX_TRACE_ID_LEN characters and non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checks a handshake signature against the raw token.
pub trait HandshakeVerifier: Send + Sync {
    fn verify(&self, token: &str, signature: &str) -> bool;

    fn name(&self) -> &'static str;
}

/// Ed25519 over the base64-decoded token bytes. The signature is standard base64.
pub struct Ed25519Verifier {
    key: VerifyingKey,
}

impl Ed25519Verifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse a base64-encoded 32-byte verifying key.
    pub fn from_base64(encoded: &str) -> Result<Self, String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("invalid handshake public key encoding: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "handshake public key must be 32 bytes".to_string())?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| format!("invalid handshake public key: {e}"))?;
        Ok(Self { key })
    }
}

impl HandshakeVerifier for Ed25519Verifier {
    fn verify(&self, token: &str, signature: &str) -> bool {
        let Ok(message) = Handshake::raw_bytes(token) else {
            return false;
        };
        let Ok(sig_bytes) = base64::engine::general_purpose::STANDARD.decode(signature) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&sig_bytes) else {
            return false;
        };
        match self.key.verify_strict(&message, &sig) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Handshake signature rejected");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "ed25519"
    }
}

/// Accepts every signature. Testing only.
pub struct InsecureVerifier;

impl HandshakeVerifier for InsecureVerifier {
    fn verify(&self, _token: &str, _signature: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "insecure"
    }
}

/// Build the configured verifier.
pub fn verifier_from_config(mode: &AuthMode) -> Result<Arc<dyn HandshakeVerifier>, String> {
    match mode {
        AuthMode::Ed25519 { public_key } => Ok(Arc::new(Ed25519Verifier::from_base64(public_key)?)),
        AuthMode::Insecure => Ok(Arc::new(InsecureVerifier)),
    }
}

/// A handshake that passed every middleware check.
#[derive(Clone, Debug)]
pub struct VerifiedHandshake {
    pub handshake: Handshake,
    pub identity: Identity,
    /// Raw query values, forwarded to the registry.
    pub token: String,
    pub signature: String,
}

impl VerifiedHandshake {
    pub fn app_id(&self) -> &str {
        &self.handshake.app_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.user_id()
    }

    pub fn submission_id(&self) -> Option<&str> {
        self.identity.submission_id()
    }
}

/// Run the checks in order and return the verified handshake.
pub fn verify_handshake(
    verifier: &dyn HandshakeVerifier,
    path: &str,
    app_id: &str,
    token: &str,
    signature: &str,
) -> Result<VerifiedHandshake, ApiError> {
    let unauthorized = |msg: &str| ApiError::Unauthorized(msg.to_string());

    let handshake = Handshake::decode(token).map_err(|_| unauthorized(INVALID_TOKEN))?;
    if !verifier.verify(token, signature) {
        return Err(unauthorized(INVALID_TOKEN));
    }

    let action = handshake.action().ok_or_else(|| unauthorized(MISSING_ACTION))?;
    if !path.starts_with(&action.path_prefix()) {
        return Err(unauthorized(UNAUTHORIZED_ACTION));
    }

    let identity = handshake
        .identity()
        .map_err(|_| unauthorized(MALFORMED_TOKEN))?;

    if handshake.app_id != app_id {
        return Err(unauthorized(TOKEN_MISMATCH));
    }

    Ok(VerifiedHandshake {
        handshake,
        identity,
        token: token.to_string(),
        signature: signature.to_string(),
    })
}

/// Extract trace ID from X-Trace-Id header or generate a new one.
fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// Attach a trace ID and run the request inside a span carrying it.
pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(&req);
    let span = tracing::info_span!("request", trace_id = %trace_id);
    req.extensions_mut().insert(trace_id);
    next.run(req).instrument(span).await
}

/// Verify `handshake_token` / `handshake_signature` for the `{app_id}` route.
pub async fn handshake_middleware(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let query = Query::<HashMap<String, String>>::try_from_uri(req.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    let token = query.get("handshake_token").map(String::as_str).unwrap_or("");
    let signature = query
        .get("handshake_signature")
        .map(String::as_str)
        .unwrap_or("");
    let app_id = params.get("app_id").map(String::as_str).unwrap_or("");

    let verified = verify_handshake(
        state.verifier.as_ref(),
        req.uri().path(),
        app_id,
        token,
        signature,
    )
    .inspect_err(|e| tracing::debug!(app_id, reason = %e, "Handshake rejected"))?;

    req.extensions_mut().insert(verified);
    Ok(next.run(req).await)
}

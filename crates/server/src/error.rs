//! API error types.
//!
//! Errors come in two classes. User-facing errors carry a message that is
//! returned to the client verbatim as `text/plain`. Everything else is
//! logged with its context and reported as `Internal error.`.

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

/// Body of every internal error response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error.";

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid request; shown to the client.
    #[error("{0}")]
    BadRequest(String),

    /// Handshake rejected; shown to the client.
    #[error("{0}")]
    Unauthorized(String),

    /// A request that was understood but cannot be completed, such as an
    /// invalid Siphonfile or a builder diagnostic; shown to the client.
    #[error("{0}")]
    User(String),

    /// A named step of a multi-step operation failed; shown to the client
    /// with a 500 status.
    #[error("{0}")]
    Failed(String),

    /// Dependency check failed.
    #[error("{0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] bundler_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] bundler_metadata::MetadataError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("core error: {0}")]
    Core(bundler_core::Error),
}

impl From<bundler_core::Error> for ApiError {
    fn from(err: bundler_core::Error) -> Self {
        match err {
            bundler_core::Error::Manifest(message) => ApiError::User(message),
            other => ApiError::Core(other),
        }
    }
}

impl ApiError {
    /// Error code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::User(_) => "user_error",
            Self::Failed(_) => "failed",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
            Self::Config(_) => "config_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Io(_) => "io_error",
            Self::Core(_) => "core_error",
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::User(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Failed(_)
            | Self::Internal(_)
            | Self::Config(_)
            | Self::Storage(_)
            | Self::Metadata(_)
            | Self::Io(_)
            | Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client, if this error is user-facing.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::User(m)
            | Self::Failed(m)
            | Self::Unavailable(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this error is user-facing.
    pub fn is_user_facing(&self) -> bool {
        self.user_message().is_some()
    }

    /// Final line of a streamed push response.
    pub fn progress_line(&self) -> String {
        match self.user_message() {
            Some(message) => format!("[ERROR] {message}\n"),
            None => format!("{INTERNAL_ERROR_MESSAGE}\n"),
        }
    }

    /// Outcome label for metrics.
    pub fn outcome(&self) -> &'static str {
        if self.is_user_facing() {
            "user_error"
        } else {
            "internal_error"
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self.user_message() {
            Some(message) => message.to_string(),
            None => {
                tracing::error!(code = self.code(), error = %self, "Request failed");
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        };
        (status, [(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_error_is_user_facing() {
        let err: ApiError = bundler_core::Error::Manifest("Bad Siphonfile".to_string()).into();
        assert_eq!(err.user_message(), Some("Bad Siphonfile"));
        assert_eq!(err.progress_line(), "[ERROR] Bad Siphonfile\n");
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = ApiError::Storage(bundler_storage::StorageError::Io(std::io::Error::other(
            "disk on fire",
        )));
        assert!(!err.is_user_facing());
        assert_eq!(err.progress_line(), "Internal error.\n");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.outcome(), "internal_error");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Unavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Failed("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

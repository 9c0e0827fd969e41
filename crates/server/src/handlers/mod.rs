//! HTTP request handlers.

pub mod health;
pub mod pull;
pub mod push;
pub mod submit;

pub use health::healthcheck;
pub use pull::pull;
pub use push::{get_hashes, push};
pub use submit::submit;

use crate::error::ApiError;
use tokio::task::JoinError;

/// Map a failed blocking task to an internal error.
pub(crate) fn blocking_failed(err: JoinError) -> ApiError {
    ApiError::Internal(format!("blocking task failed: {err}"))
}

//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Manifest validation failure. The message is shown to the user as-is.
    #[error("{0}")]
    Manifest(String),

    #[error("invalid handshake token: {0}")]
    InvalidHandshake(String),

    #[error("malformed handshake: {0}")]
    MalformedHandshake(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

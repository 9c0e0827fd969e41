//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("volatile tier error: {0}")]
    Volatile(String),
}

impl StorageError {
    /// Whether another attempt of the same operation could succeed.
    ///
    /// Missing objects, key validation failures and configuration problems
    /// are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Io(_) | StorageError::S3(_) | StorageError::Volatile(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::Io(std::io::Error::other("reset")).is_retryable());
        assert!(StorageError::S3("timeout".into()).is_retryable());
        assert!(!StorageError::NotFound("k".to_string()).is_retryable());
        assert!(!StorageError::InvalidKey("../k".to_string()).is_retryable());
        assert!(!StorageError::Config("bad".to_string()).is_retryable());
    }
}

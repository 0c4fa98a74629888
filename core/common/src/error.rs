//! Common error types for vault-sync.

use thiserror::Error;

/// Top-level error type for vault-sync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Ciphertext failed authentication: tampering, truncation, or wrong key.
    /// Never retried automatically.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A blob or pointer referenced by a manifest is missing.
    /// Treated as store corruption, fatal.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The manifest pointer moved underneath a sync run. Retryable:
    /// the caller must re-run the whole fetch/diff/resolve/publish cycle.
    #[error("Concurrent publish on pointer '{pointer}'")]
    ConcurrentPublish { pointer: String },

    /// A store operation exceeded its deadline. Retryable.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Cryptographic operation failed (bad key length, cipher error).
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Object store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Whether this error is transient and safe to retry.
    ///
    /// Crypto and integrity failures are never retryable: silent data
    /// corruption is worse than a halted sync.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConcurrentPublish { .. } | Error::Timeout(_) | Error::Io(_)
        )
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ConcurrentPublish {
            pointer: "manifest.head".to_string()
        }
        .is_retryable());
        assert!(Error::Timeout("get_object".to_string()).is_retryable());
        assert!(!Error::AuthenticationFailed("bad tag".to_string()).is_retryable());
        assert!(!Error::NotFound("blob abc".to_string()).is_retryable());
    }
}

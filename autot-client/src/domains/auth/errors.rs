//! Authentication error types
//!
//! Session and persistence failures for the token store, using thiserror
//! for proper error trait implementations.

use reqwest::StatusCode;
use thiserror::Error;

use autot_model::TokenFormatError;

/// Main authentication error type
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token validation or session state rejected the operation
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Storage initialization or operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Token-related errors
///
/// Cloneable because a single refresh outcome is handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token refresh rejected with status {0}")]
    RefreshRejected(StatusCode),

    #[error("Invalid token format: {0}")]
    InvalidFormat(#[from] TokenFormatError),
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to initialize storage: {0}")]
    InitFailed(String),

    #[error("Failed to read from storage")]
    ReadFailed(#[source] std::io::Error),

    #[error("Failed to write to storage")]
    WriteFailed(#[source] std::io::Error),

    #[error("Corrupted storage data")]
    CorruptedData(#[source] serde_json::Error),
}

/// Result type alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

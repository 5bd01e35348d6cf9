//! Request error taxonomy.
//!
//! Every variant is `Clone` so one refresh failure can be delivered to all
//! requests that were waiting on it.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::domains::auth::errors::{StorageError, TokenError};

/// Failure of one authenticated request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// No session, or the access token was rejected and the refresh failed.
    /// The token store has already cleared itself; show the login view.
    #[error("Session expired: {0}")]
    AuthExpired(#[from] TokenError),

    /// Non-2xx response, including a 401 that survived one refresh and retry.
    #[error("Request failed with status {status}")]
    RequestFailed {
        status: StatusCode,
        /// Parsed error payload when the server sent JSON.
        body: Option<Value>,
    },

    /// The request never produced a usable HTTP response.
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// The caller's body could not be encoded.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::AuthExpired(TokenError::RefreshRejected(status)) => Some(*status),
            _ => None,
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired(_))
    }

    /// Server-supplied message from the error payload (`detail` or `error`).
    pub fn detail(&self) -> Option<&str> {
        let ApiError::RequestFailed {
            body: Some(body), ..
        } = self
        else {
            return None;
        };
        match body {
            Value::String(message) => Some(message),
            Value::Object(fields) => ["detail", "error"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str)),
            _ => None,
        }
    }

    /// Text suitable for a transient error banner.
    pub fn user_message(&self) -> String {
        match self.detail() {
            Some(detail) => format!("{self} - {detail}"),
            None => self.to_string(),
        }
    }
}

/// Network-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Connection timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if err.is_connect() {
            NetworkError::Connect(err.to_string())
        } else if err.is_decode() || err.is_body() {
            NetworkError::InvalidResponse(err.to_string())
        } else {
            NetworkError::RequestFailed(err.to_string())
        }
    }
}

/// Result type alias for request operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Failure while wiring a client from configuration.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to build HTTP transport: {0}")]
    Transport(#[from] NetworkError),

    #[error("Failed to open session storage: {0}")]
    Storage(#[from] StorageError),
}

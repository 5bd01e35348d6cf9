//! Relative endpoint paths.
//!
//! Paths never start with a slash; they are appended to a base URL that
//! always ends with one.

/// Endpoints resolved against the auth base (`{server}/auth/`).
pub mod auth {
    /// Exchange credentials for a token pair.
    pub const TOKEN: &str = "token/";
    /// Exchange a refresh token for a new access token.
    pub const TOKEN_REFRESH: &str = "token/refresh/";
}

/// Endpoints resolved against the API base (`{server}/api/`).
pub mod api {
    /// Count of background jobs the server has not finished yet.
    pub const PROGRESS: &str = "progress/";
}

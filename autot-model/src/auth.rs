//! Token endpoint payloads.
//!
//! Token values are bearer credentials: they are zeroed on drop and never
//! printed by `Debug`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const REDACTED: &str = "<redacted>";

/// A token value failed the RFC 6750 `b64token` grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenFormatError {
    #[error("access token is not a well-formed bearer token")]
    Access,
    #[error("refresh token is not a well-formed bearer token")]
    Refresh,
}

/// Returns true when `value` can be sent as `Authorization: Bearer <value>`.
///
/// Accepts the `b64token` alphabet (`ALPHA / DIGIT / "-" / "." / "_" / "~" /
/// "+" / "/"`) followed by optional `=` padding. JWTs fall inside it.
pub fn is_bearer_token(value: &str) -> bool {
    let body = value.trim_end_matches('=');
    !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'/'))
}

#[derive(Deserialize)]
struct RawTokenPair {
    access: String,
    refresh: String,
}

impl TryFrom<RawTokenPair> for TokenPair {
    type Error = TokenFormatError;

    fn try_from(raw: RawTokenPair) -> Result<Self, Self::Error> {
        TokenPair::new(raw.access, raw.refresh)
    }
}

/// Access/refresh credentials returned by `POST token/`.
///
/// Both halves are validated on construction and on deserialization, so a
/// `TokenPair` value is never partial or malformed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(try_from = "RawTokenPair")]
pub struct TokenPair {
    access: String,
    refresh: String,
}

impl TokenPair {
    /// Build a pair, rejecting values that are not bearer tokens.
    pub fn new(
        access: impl Into<String>,
        refresh: impl Into<String>,
    ) -> Result<Self, TokenFormatError> {
        let access = access.into();
        let refresh = refresh.into();
        if !is_bearer_token(&access) {
            return Err(TokenFormatError::Access);
        }
        if !is_bearer_token(&refresh) {
            return Err(TokenFormatError::Refresh);
        }
        Ok(Self { access, refresh })
    }

    /// Short-lived credential sent on every authenticated request.
    pub fn access(&self) -> &str {
        &self.access
    }

    /// Longer-lived credential exchanged for a new access token.
    pub fn refresh(&self) -> &str {
        &self.refresh
    }

    /// Swap in a refreshed access token, leaving the refresh token alone.
    pub fn replace_access(&mut self, access: String) -> Result<(), TokenFormatError> {
        if !is_bearer_token(&access) {
            return Err(TokenFormatError::Access);
        }
        self.access.zeroize();
        self.access = access;
        Ok(())
    }

    /// Swap in a rotated refresh token.
    pub fn replace_refresh(&mut self, refresh: String) -> Result<(), TokenFormatError> {
        if !is_bearer_token(&refresh) {
            return Err(TokenFormatError::Refresh);
        }
        self.refresh.zeroize();
        self.refresh = refresh;
        Ok(())
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &REDACTED)
            .field("refresh", &REDACTED)
            .finish()
    }
}

/// Body of `POST token/`.
#[derive(Clone, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &REDACTED)
            .finish()
    }
}

/// Body of `POST token/refresh/`.
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

impl fmt::Debug for RefreshRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh", &REDACTED)
            .finish()
    }
}

/// Success body of `POST token/refresh/`.
///
/// Servers that rotate refresh tokens also return the replacement.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AccessTokenResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl fmt::Debug for AccessTokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenResponse")
            .field("access", &REDACTED)
            .field("rotated", &self.refresh.is_some())
            .finish()
    }
}

//! Client configuration
//!
//! Read from `AUTOT_*` environment variables; the `autot` binary loads a
//! `.env` file first.
//!
//! | variable                | default                      |
//! |-------------------------|------------------------------|
//! | `AUTOT_SERVER_URL`      | `http://localhost:8000`      |
//! | `AUTOT_API_URL`         | `{server}/api/`              |
//! | `AUTOT_AUTH_URL`        | `{server}/auth/`             |
//! | `AUTOT_POLL_INTERVAL`   | `3s`                         |
//! | `AUTOT_REQUEST_TIMEOUT` | `30s`                        |
//! | `AUTOT_SESSION_FILE`    | platform data dir            |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const SERVER_URL_VAR: &str = "AUTOT_SERVER_URL";
const API_URL_VAR: &str = "AUTOT_API_URL";
const AUTH_URL_VAR: &str = "AUTOT_AUTH_URL";
const POLL_INTERVAL_VAR: &str = "AUTOT_POLL_INTERVAL";
const REQUEST_TIMEOUT_VAR: &str = "AUTOT_REQUEST_TIMEOUT";
const SESSION_FILE_VAR: &str = "AUTOT_SESSION_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{key} cannot be used as a base URL: {value}")]
    NotABase { key: &'static str, value: String },

    #[error("{key} is not a valid duration: {source}")]
    InvalidDuration {
        key: &'static str,
        #[source]
        source: humantime::DurationError,
    },

    #[error("{key} must be greater than zero")]
    ZeroDuration { key: &'static str },
}

/// Endpoints and timings for [`ApiClient`](crate::ApiClient) and
/// [`ProgressPoller`](crate::ProgressPoller).
///
/// Base URLs always end with `/` so relative paths append cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server root; image paths resolve against it
    pub server_origin: Url,
    /// Prefix for resource paths (`keyword/`, `progress/`, ...)
    pub api_base: Url,
    /// Prefix for token endpoints
    pub auth_base: Url,
    /// Poll cadence while background jobs are pending
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    /// Override for the session file location
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults for a server root, with `api/` and `auth/` beneath it
    pub fn for_server(server_url: &str) -> Result<Self, ConfigError> {
        let server_origin = parse_base(SERVER_URL_VAR, server_url)?;
        let api_base = join_base(API_URL_VAR, &server_origin, "api/")?;
        let auth_base = join_base(AUTH_URL_VAR, &server_origin, "auth/")?;

        Ok(Self {
            server_origin,
            api_base,
            auth_base,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session_file: None,
        })
    }

    /// Build from the process environment
    pub fn from_environment() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let server_url = var(SERVER_URL_VAR).unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let mut config = Self::for_server(&server_url)?;

        if let Some(value) = var(API_URL_VAR) {
            config.api_base = parse_base(API_URL_VAR, &value)?;
        }
        if let Some(value) = var(AUTH_URL_VAR) {
            config.auth_base = parse_base(AUTH_URL_VAR, &value)?;
        }
        if let Some(value) = var(POLL_INTERVAL_VAR) {
            config.poll_interval = parse_duration(POLL_INTERVAL_VAR, &value)?;
        }
        if let Some(value) = var(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = parse_duration(REQUEST_TIMEOUT_VAR, &value)?;
        }
        if let Some(value) = var(SESSION_FILE_VAR) {
            config.session_file = Some(PathBuf::from(value.trim()));
        }

        Ok(config)
    }

    /// Resource URL; absolute `http(s)://` paths pass through unchanged
    pub fn api_url(&self, path: &str) -> String {
        resolve(&self.api_base, path)
    }

    pub fn auth_url(&self, path: &str) -> String {
        resolve(&self.auth_base, path)
    }

    /// URL relative to the server root, used for media images
    pub fn origin_url(&self, path: &str) -> String {
        resolve(&self.server_origin, path)
    }
}

fn resolve(base: &Url, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}{}", base, path.trim_start_matches('/'))
}

fn parse_base(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let mut url =
        Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::NotABase {
            key,
            value: value.to_string(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn join_base(key: &'static str, base: &Url, segment: &str) -> Result<Url, ConfigError> {
    base.join(segment)
        .map_err(|source| ConfigError::InvalidUrl { key, source })
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration = humantime::parse_duration(value.trim())
        .map_err(|source| ConfigError::InvalidDuration { key, source })?;
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration { key });
    }
    Ok(duration)
}

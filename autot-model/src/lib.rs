//! Wire-level data model shared by the autot client crates.
//!
//! Everything here mirrors a JSON document exchanged with the media library
//! server: the token endpoints under the auth base, and the background job
//! progress endpoint under the API base.

pub mod auth;
pub mod progress;
pub mod routes;

pub use auth::{AccessTokenResponse, Credentials, RefreshRequest, TokenFormatError, TokenPair};
pub use progress::ProgressResponse;

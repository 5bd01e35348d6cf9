//! autot client library
//!
//! Data-access layer for the autot media library: an authenticated request
//! client that transparently refreshes expired access tokens, the persisted
//! session it draws tokens from, and a poller that tracks pending background
//! jobs on the server.
//!
//! Notes
//! - [`AutotClient::connect`] wires everything from a [`ClientConfig`].
//! - The `autot` binary in `src/main.rs` is a thin command-line collaborator
//!   over this library.

pub mod bootstrap;
pub mod config;
pub mod domains;
pub mod infrastructure;

pub use autot_model as model;

pub use bootstrap::AutotClient;
pub use config::{ClientConfig, ConfigError};
pub use domains::auth::{
    FileStorage, KeyValueStorage, MemoryStorage, SessionState, StorageError, TokenError,
    TokenStore,
};
pub use domains::progress::{PollTrigger, ProgressPoller, ProgressSource, ProgressState};
pub use infrastructure::{
    ApiClient, ApiError, ApiPayload, ApiResult, BootstrapError, HttpRequest, HttpResponse,
    HttpTransport, ImageBlob, NetworkError, ReqwestTransport,
};

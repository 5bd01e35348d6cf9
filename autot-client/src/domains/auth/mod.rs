//! Session tokens: state, persistence and refresh.

pub mod errors;
pub mod state_types;
pub mod storage;
pub mod token_store;

pub use errors::{AuthError, AuthResult, StorageError, TokenError};
pub use state_types::{SessionState, SessionStateStore};
pub use storage::{
    ACCESS_TOKEN_KEY, FileStorage, KeyValueStorage, MemoryStorage, REFRESH_TOKEN_KEY,
};
pub use token_store::TokenStore;

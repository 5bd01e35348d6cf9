//! Session token state with single-flight refresh
//!
//! ## Refresh coordination
//!
//! Servers that rotate refresh tokens reject a refresh token the second time
//! it is used, so two overlapping refreshes would end the session. The store
//! therefore keeps at most one refresh future in a shared slot:
//!
//! - the first caller that finds the slot empty creates the future and parks
//!   a [`Shared`] handle to it in the slot,
//! - every later caller clones that handle and awaits the same outcome,
//! - the future empties the slot itself as soon as it settles, success or
//!   failure, so the next 401 starts a fresh refresh.
//!
//! The slot lock is never held across an await.

use std::fmt;
use std::sync::{Arc, Weak};

use autot_model::{AccessTokenResponse, RefreshRequest, TokenPair, auth::is_bearer_token};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use parking_lot::Mutex;
use reqwest::Method;
use tokio::sync::watch;

use crate::domains::auth::errors::{AuthResult, StorageError, TokenError};
use crate::domains::auth::state_types::{SessionState, SessionStateStore};
use crate::domains::auth::storage::{ACCESS_TOKEN_KEY, KeyValueStorage, REFRESH_TOKEN_KEY};
use crate::infrastructure::errors::{ApiResult, NetworkError};
use crate::infrastructure::transport::{HttpRequest, HttpTransport};

type RefreshFuture = Shared<BoxFuture<'static, ApiResult<String>>>;

struct PendingRefresh {
    generation: u64,
    future: RefreshFuture,
}

#[derive(Default)]
struct RefreshSlot {
    pending: Option<PendingRefresh>,
    generation: u64,
}

struct TokenStoreInner {
    state: SessionStateStore,
    storage: Arc<dyn KeyValueStorage>,
    transport: Arc<dyn HttpTransport>,
    refresh_url: String,
    refresh: Mutex<RefreshSlot>,
}

/// Current access/refresh token pair, persisted across restarts.
///
/// Cheap to clone; clones share one session and one refresh slot.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<TokenStoreInner>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("logged_in", &self.is_logged_in())
            .field("refresh_in_flight", &self.refresh_in_flight())
            .field("refresh_url", &self.inner.refresh_url)
            .finish()
    }
}

async fn read_stored_pair(
    storage: &dyn KeyValueStorage,
) -> Result<(Option<String>, Option<String>), StorageError> {
    let access = storage.get(ACCESS_TOKEN_KEY).await?;
    let refresh = storage.get(REFRESH_TOKEN_KEY).await?;
    Ok((access, refresh))
}

impl TokenStore {
    /// Create a logged-out store without reading storage
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<dyn HttpTransport>,
        refresh_url: impl Into<String>,
    ) -> Self {
        Self::with_state(SessionState::LoggedOut, storage, transport, refresh_url.into())
    }

    /// Seed the session from durable storage.
    ///
    /// A stored pair with either half missing or malformed, or a storage
    /// document that cannot be parsed, is treated as logged out and the
    /// leftovers are removed.
    pub async fn load(
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<dyn HttpTransport>,
        refresh_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let (access, refresh) = match read_stored_pair(storage.as_ref()).await {
            Ok(stored) => stored,
            Err(StorageError::CorruptedData(e)) => {
                warn!("[TokenStore] Session storage unreadable, starting logged out: {}", e);
                if let Err(e) = storage
                    .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
                    .await
                {
                    warn!("[TokenStore] Failed to reset session storage: {}", e);
                }
                (None, None)
            }
            Err(e) => return Err(e),
        };

        let state = match (access, refresh) {
            (Some(access), Some(refresh)) => match TokenPair::new(access, refresh) {
                Ok(pair) => {
                    info!("[TokenStore] Restored session from storage");
                    SessionState::LoggedIn(pair)
                }
                Err(e) => {
                    warn!("[TokenStore] Discarding stored session: {}", e);
                    storage
                        .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
                        .await?;
                    SessionState::LoggedOut
                }
            },
            (None, None) => SessionState::LoggedOut,
            _ => {
                warn!("[TokenStore] Discarding partial session in storage");
                storage
                    .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
                    .await?;
                SessionState::LoggedOut
            }
        };

        Ok(Self::with_state(state, storage, transport, refresh_url.into()))
    }

    fn with_state(
        state: SessionState,
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<dyn HttpTransport>,
        refresh_url: String,
    ) -> Self {
        Self {
            inner: Arc::new(TokenStoreInner {
                state: SessionStateStore::new(state),
                storage,
                transport,
                refresh_url,
                refresh: Mutex::new(RefreshSlot::default()),
            }),
        }
    }

    /// Current access token, if logged in
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .with_state(|state| state.access_token().map(str::to_owned))
    }

    fn refresh_token(&self) -> Option<String> {
        self.inner
            .state
            .with_state(|state| state.refresh_token().map(str::to_owned))
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.state.is_logged_in()
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.state.current()
    }

    /// Subscribe to login/logout transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// True while a refresh request is outstanding
    pub fn refresh_in_flight(&self) -> bool {
        self.inner.refresh.lock().pending.is_some()
    }

    /// Replace both tokens and persist them.
    ///
    /// The in-memory session switches immediately; a storage failure is
    /// returned but the session stays usable until the process exits.
    pub async fn set_token_pair(&self, pair: TokenPair) -> Result<(), StorageError> {
        self.inner.state.log_in(pair.clone());
        info!("[TokenStore] Session started");
        self.inner
            .storage
            .set_many(&[
                (ACCESS_TOKEN_KEY, pair.access()),
                (REFRESH_TOKEN_KEY, pair.refresh()),
            ])
            .await
    }

    /// Replace the access token after a refresh, leaving the refresh token
    /// untouched.
    pub async fn set_access_token(&self, token: String) -> AuthResult<()> {
        let mut rejected = None;
        let updated = self.inner.state.update_tokens(|pair| {
            match pair.replace_access(token.clone()) {
                Ok(()) => true,
                Err(e) => {
                    rejected = Some(e);
                    false
                }
            }
        });
        if let Some(e) = rejected {
            return Err(TokenError::from(e).into());
        }
        if !updated {
            return Err(TokenError::NotAuthenticated.into());
        }

        self.inner.storage.set(ACCESS_TOKEN_KEY, &token).await?;
        Ok(())
    }

    /// Drop both tokens and persist their absence. Safe to call repeatedly.
    pub async fn clear(&self) {
        if self.inner.state.log_out() {
            info!("[TokenStore] Session ended");
        }
        if let Err(e) = self
            .inner
            .storage
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .await
        {
            warn!("[TokenStore] Failed to clear stored session: {}", e);
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers share one network request and receive the same
    /// token or the same error. On rejection the session is cleared and the
    /// error is `AuthExpired`. Logged-out stores fail without a request.
    pub async fn refresh(&self) -> ApiResult<String> {
        let future = {
            let mut slot = self.inner.refresh.lock();
            if let Some(pending) = slot.pending.as_ref() {
                debug!(
                    "[TokenStore] Joining in-flight refresh #{}",
                    pending.generation
                );
                pending.future.clone()
            } else {
                if !self.inner.state.is_logged_in() {
                    debug!("[TokenStore] Refresh requested while logged out");
                    return Err(TokenError::NotAuthenticated.into());
                }

                slot.generation += 1;
                let generation = slot.generation;
                let future = Self::refresh_task(Arc::downgrade(&self.inner), generation)
                    .boxed()
                    .shared();
                slot.pending = Some(PendingRefresh {
                    generation,
                    future: future.clone(),
                });
                future
            }
        };

        future.await
    }

    async fn refresh_task(inner: Weak<TokenStoreInner>, generation: u64) -> ApiResult<String> {
        let Some(inner) = inner.upgrade() else {
            return Err(TokenError::NotAuthenticated.into());
        };
        let store = TokenStore { inner };
        let result = store.perform_refresh().await;

        let mut slot = store.inner.refresh.lock();
        if slot
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation)
        {
            slot.pending = None;
        }
        drop(slot);

        result
    }

    async fn perform_refresh(&self) -> ApiResult<String> {
        let Some(refresh_token) = self.refresh_token() else {
            self.clear().await;
            return Err(TokenError::NotAuthenticated.into());
        };

        info!("[TokenStore] Attempting to refresh access token");

        let request = HttpRequest::new(Method::POST, &self.inner.refresh_url).json(
            &RefreshRequest {
                refresh: &refresh_token,
            },
        )?;

        let response = match self.inner.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                // Transport failures say nothing about the refresh token; keep the session.
                warn!("[TokenStore] Token refresh could not reach the server: {}", e);
                return Err(e.into());
            }
        };

        if !response.status.is_success() {
            warn!(
                "[TokenStore] Token refresh rejected with status {}",
                response.status
            );
            self.clear().await;
            return Err(TokenError::RefreshRejected(response.status).into());
        }

        let granted: AccessTokenResponse = serde_json::from_slice(&response.body)
            .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;

        if !is_bearer_token(&granted.access) {
            warn!("[TokenStore] Refresh returned a malformed access token");
            self.clear().await;
            return Err(TokenError::InvalidFormat(autot_model::TokenFormatError::Access).into());
        }

        let access = granted.access.clone();
        let rotated = granted
            .refresh
            .clone()
            .filter(|refresh| is_bearer_token(refresh));

        // Only apply the grant to the session it was requested for; a logout
        // or re-login while the request was in flight wins.
        let applied = self.inner.state.update_tokens(|pair| {
            if pair.refresh() != refresh_token {
                return false;
            }
            let mut changed = pair.replace_access(access.clone()).is_ok();
            if let Some(refresh) = &rotated {
                changed |= pair.replace_refresh(refresh.clone()).is_ok();
            }
            changed
        });
        if !applied {
            info!("[TokenStore] Session changed during refresh, discarding grant");
            return Err(TokenError::NotAuthenticated.into());
        }

        let persisted = match &rotated {
            Some(refresh) => {
                self.inner
                    .storage
                    .set_many(&[
                        (ACCESS_TOKEN_KEY, access.as_str()),
                        (REFRESH_TOKEN_KEY, refresh.as_str()),
                    ])
                    .await
            }
            None => self.inner.storage.set(ACCESS_TOKEN_KEY, &access).await,
        };
        if let Err(e) = persisted {
            warn!("[TokenStore] Failed to persist refreshed token: {}", e);
        }

        info!(
            "[TokenStore] Successfully refreshed access token{}",
            if rotated.is_some() {
                " (refresh token rotated)"
            } else {
                ""
            }
        );
        Ok(access)
    }
}

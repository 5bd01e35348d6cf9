use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use autot_model::{Credentials, ProgressResponse, TokenPair, routes};
use log::{debug, info, warn};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::config::ClientConfig;
use crate::domains::auth::errors::TokenError;
use crate::domains::auth::token_store::TokenStore;
use crate::infrastructure::api_types::{ApiPayload, ImageBlob};
use crate::infrastructure::errors::{ApiError, ApiResult, NetworkError};
use crate::infrastructure::transport::{HttpRequest, HttpResponse, HttpTransport};

const LOGIN_FAILED: &str = "Failed to login";

/// Authenticated client for the media library API
///
/// Every verb injects the current access token. A 401 triggers one shared
/// refresh through the [`TokenStore`] followed by exactly one retry; other
/// failures are returned to the caller and mirrored in the error slot.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    config: Arc<ClientConfig>,
    error: Arc<watch::Sender<Option<String>>>,
    in_flight: Arc<AtomicUsize>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_base", &self.config.api_base.as_str())
            .field("auth_base", &self.config.auth_base.as_str())
            .field("has_token", &self.tokens.is_logged_in())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

/// Decrements the in-flight counter however the request ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn HttpTransport>, tokens: TokenStore) -> Self {
        info!(
            "[ApiClient] Creating API client with base URL: {}",
            config.api_base
        );
        let (error, _) = watch::channel(None);
        Self {
            transport,
            tokens,
            config: Arc::new(config),
            error: Arc::new(error),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Resource URL for `path`; absolute URLs pass through unchanged
    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        self.config.api_url(path.as_ref())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn is_logged_in(&self) -> bool {
        self.tokens.is_logged_in()
    }

    /// Message of the most recent failed call, cleared when the next call starts
    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    pub fn clear_error(&self) {
        self.set_error(None);
    }

    /// True while any foreground request is outstanding
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub async fn get(&self, path: &str) -> ApiResult<ApiPayload> {
        self.request(Method::GET, path, None::<&()>).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiPayload> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiPayload> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<ApiPayload> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn del(&self, path: &str) -> ApiResult<ApiPayload> {
        self.request(Method::DELETE, path, None::<&()>).await
    }

    /// GET and deserialize a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let result = self.get(path).await.and_then(ApiPayload::json);
        if let Err(e) = &result {
            self.set_error(Some(e.user_message()));
        }
        result
    }

    /// Fetch a media image. `path` is resolved against the server root,
    /// where the library serves posters and stills.
    pub async fn get_image(&self, path: &str) -> ApiResult<ImageBlob> {
        self.clear_error();
        let url = self.config.origin_url(path);
        let result = self
            .tracked(self.execute(Method::GET, url, None))
            .await
            .and_then(ApiPayload::into_image);
        if let Err(e) = &result {
            self.set_error(Some(e.user_message()));
        }
        result
    }

    /// Pending job count for the progress poller.
    ///
    /// Runs outside the error slot and the loading flag so background polling
    /// never flashes a banner or spinner.
    pub async fn pending_jobs(&self) -> ApiResult<u64> {
        let url = self.build_url(routes::api::PROGRESS);
        let payload = self.execute(Method::GET, url, None).await?;
        let progress: ProgressResponse = payload.json()?;
        Ok(progress.pending_jobs)
    }

    /// Exchange credentials for a token pair and start a session.
    ///
    /// On failure the error slot carries the server's `detail`, or a generic
    /// message when there is none.
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<()> {
        self.clear_error();
        let _guard = InFlightGuard::new(&self.in_flight);
        let result = self.perform_login(credentials).await;
        if let Err(e) = &result {
            warn!("[ApiClient] Login failed: {}", e);
            let message = e.detail().unwrap_or(LOGIN_FAILED).to_string();
            self.set_error(Some(message));
        }
        result
    }

    async fn perform_login(&self, credentials: &Credentials) -> ApiResult<()> {
        let url = self.config.auth_url(routes::auth::TOKEN);
        let request = HttpRequest::new(Method::POST, url).json(credentials)?;
        let response = self.transport.send(request).await?;
        if !response.status.is_success() {
            return Err(Self::failure(response));
        }

        let pair: TokenPair = serde_json::from_slice(&response.body)
            .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;
        if let Err(e) = self.tokens.set_token_pair(pair).await {
            warn!("[ApiClient] Logged in but failed to persist session: {}", e);
        }
        info!("[ApiClient] Logged in as {}", credentials.username);
        Ok(())
    }

    /// End the session locally
    pub async fn logout(&self) {
        self.tokens.clear().await;
        self.clear_error();
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<ApiPayload> {
        self.clear_error();
        let result = match body.map(serde_json::to_vec).transpose() {
            Ok(body) => {
                let url = self.build_url(path);
                self.tracked(self.execute(method, url, body)).await
            }
            Err(e) => Err(ApiError::InvalidRequest(e.to_string())),
        };
        if let Err(e) = &result {
            self.set_error(Some(e.user_message()));
        }
        result
    }

    async fn tracked<F>(&self, request: F) -> ApiResult<ApiPayload>
    where
        F: Future<Output = ApiResult<ApiPayload>>,
    {
        let _guard = InFlightGuard::new(&self.in_flight);
        request.await
    }

    /// Send once, and on 401 refresh and retry exactly once
    async fn execute(
        &self,
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
    ) -> ApiResult<ApiPayload> {
        let Some(token) = self.tokens.access_token() else {
            debug!("[ApiClient] No session, not sending {} {}", method, url);
            return Err(TokenError::NotAuthenticated.into());
        };

        let response = self.send(&method, &url, body.clone(), &token).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Self::decode(response);
        }

        // Another request may already have refreshed while this one was out.
        let token = match self.tokens.access_token() {
            Some(current) if current != token => current,
            _ => {
                info!("[ApiClient] Token expired, attempting refresh");
                self.tokens.refresh().await?
            }
        };

        debug!("[ApiClient] Retrying {} {} with refreshed token", method, url);
        let retried = self.send(&method, &url, body, &token).await?;
        if retried.status == StatusCode::UNAUTHORIZED {
            warn!("[ApiClient] Still unauthorized after refresh: {} {}", method, url);
        }
        Self::decode(retried)
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<Vec<u8>>,
        token: &str,
    ) -> ApiResult<HttpResponse> {
        let mut request = HttpRequest::new(method.clone(), url).bearer(token)?;
        if let Some(body) = body {
            request = request.json_bytes(body);
        }
        match self.transport.send(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("[ApiClient] {} {} failed: {}", method, url, e);
                Err(e.into())
            }
        }
    }

    fn decode(response: HttpResponse) -> ApiResult<ApiPayload> {
        if response.status.is_success() {
            ApiPayload::from_response(response)
        } else {
            Err(Self::failure(response))
        }
    }

    fn failure(response: HttpResponse) -> ApiError {
        let body = if response.body.is_empty() {
            None
        } else {
            serde_json::from_slice(&response.body).ok().or_else(|| {
                String::from_utf8(response.body)
                    .ok()
                    .map(|text| Value::String(text.trim().to_string()))
                    .filter(|text| text.as_str().is_some_and(|t| !t.is_empty()))
            })
        };
        ApiError::RequestFailed {
            status: response.status,
            body,
        }
    }

    fn set_error(&self, message: Option<String>) {
        self.error.send_if_modified(|current| {
            if *current == message {
                false
            } else {
                *current = message;
                true
            }
        });
    }
}

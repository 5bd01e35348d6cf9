//! Scripted media server for client tests
//!
//! `FakeServer` implements `HttpTransport` directly, so the client under test
//! runs its real request, refresh and decode paths without a socket. Every
//! request is recorded for assertions.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autot_client::domains::auth::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use autot_client::{
    AutotClient, ClientConfig, HttpRequest, HttpResponse, HttpTransport, KeyValueStorage,
    MemoryStorage, NetworkError,
};
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

pub const SERVER: &str = "http://media.test";
pub const TOKEN_PATH: &str = "/auth/token/";
pub const REFRESH_PATH: &str = "/auth/token/refresh/";
pub const PROGRESS_PATH: &str = "/api/progress/";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

/// One scripted answer for `GET progress/`
#[derive(Debug, Clone, Copy)]
pub enum ProgressReply {
    Count(u64),
    Status(StatusCode),
    Offline,
}

#[derive(Debug, Clone)]
struct RefreshGrant {
    access: String,
    rotated: Option<String>,
    usable: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    users: HashMap<String, String>,
    login_pair: Option<(String, String)>,
    valid_access: HashSet<String>,
    refresh_grants: HashMap<String, RefreshGrant>,
    refresh_status: Option<StatusCode>,
    refresh_unreachable: bool,
    progress: VecDeque<ProgressReply>,
    overrides: HashMap<String, HttpResponse>,
    offline: bool,
    latency: Duration,
    requests: Vec<RecordedRequest>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.state
            .lock()
            .users
            .insert(username.into(), password.into());
        self
    }

    /// Pair handed out by a successful login; the access token is accepted
    pub fn login_returns(self, access: &str, refresh: &str) -> Self {
        self.state.lock().login_pair = Some((access.into(), refresh.into()));
        self
    }

    pub fn accept_access(&self, token: &str) {
        self.state.lock().valid_access.insert(token.into());
    }

    /// Simulate expiry of an access token
    pub fn revoke_access(&self, token: &str) {
        self.state.lock().valid_access.remove(token);
    }

    /// `refresh` may be exchanged for `access`; the new token is accepted
    pub fn grant_refresh(&self, refresh: &str, access: &str) {
        self.state.lock().refresh_grants.insert(
            refresh.into(),
            RefreshGrant {
                access: access.into(),
                rotated: None,
                usable: true,
            },
        );
    }

    /// The refresh succeeds but resources keep rejecting the new token
    pub fn grant_unusable_refresh(&self, refresh: &str, access: &str) {
        self.state.lock().refresh_grants.insert(
            refresh.into(),
            RefreshGrant {
                access: access.into(),
                rotated: None,
                usable: false,
            },
        );
    }

    /// Like `grant_refresh`, but the server rotates the refresh token and
    /// forgets the old one
    pub fn grant_rotating_refresh(&self, refresh: &str, access: &str, next_refresh: &str) {
        self.state.lock().refresh_grants.insert(
            refresh.into(),
            RefreshGrant {
                access: access.into(),
                rotated: Some(next_refresh.into()),
                usable: true,
            },
        );
    }

    pub fn fail_refresh_with(&self, status: StatusCode) {
        self.state.lock().refresh_status = Some(status);
    }

    pub fn make_refresh_unreachable(&self) {
        self.state.lock().refresh_unreachable = true;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Answers for `GET progress/`, consumed in order; the last one repeats
    pub fn queue_progress(&self, replies: impl IntoIterator<Item = ProgressReply>) {
        self.state.lock().progress.extend(replies);
    }

    /// Fixed response for an authorized request to `path`
    pub fn respond(&self, path: &str, response: HttpResponse) {
        self.state.lock().overrides.insert(path.into(), response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }
}

impl ServerState {
    fn login(&mut self, request: &HttpRequest) -> HttpResponse {
        let body = request.json_body().unwrap_or(Value::Null);
        let username = body["username"].as_str().unwrap_or_default();
        let password = body["password"].as_str().unwrap_or_default();

        let known = self.users.get(username).is_some_and(|p| p == password);
        match (&self.login_pair, known) {
            (Some((access, refresh)), true) => {
                let (access, refresh) = (access.clone(), refresh.clone());
                self.valid_access.insert(access.clone());
                HttpResponse::json(
                    StatusCode::OK,
                    &json!({"access": access, "refresh": refresh}),
                )
            }
            _ => HttpResponse::json(
                StatusCode::UNAUTHORIZED,
                &json!({"detail": "No active account found with the given credentials"}),
            ),
        }
    }

    fn refresh(&mut self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        if self.refresh_unreachable {
            return Err(NetworkError::Timeout);
        }
        if let Some(status) = self.refresh_status {
            return Ok(invalid_token(status));
        }

        let body = request.json_body().unwrap_or(Value::Null);
        let refresh = body["refresh"].as_str().unwrap_or_default().to_string();
        let Some(grant) = self.refresh_grants.get(&refresh).cloned() else {
            return Ok(invalid_token(StatusCode::UNAUTHORIZED));
        };

        if grant.usable {
            self.valid_access.insert(grant.access.clone());
        }
        let response = match &grant.rotated {
            Some(next) => {
                self.refresh_grants.remove(&refresh);
                json!({"access": grant.access, "refresh": next})
            }
            None => json!({"access": grant.access}),
        };
        Ok(HttpResponse::json(StatusCode::OK, &response))
    }

    fn resource(&mut self, request: &HttpRequest, path: &str) -> Result<HttpResponse, NetworkError> {
        let authorized = request
            .bearer_token()
            .is_some_and(|token| self.valid_access.contains(token));
        if !authorized {
            return Ok(invalid_token(StatusCode::UNAUTHORIZED));
        }

        if path == PROGRESS_PATH {
            let reply = if self.progress.len() > 1 {
                self.progress.pop_front()
            } else {
                self.progress.front().copied()
            };
            return match reply.unwrap_or(ProgressReply::Count(0)) {
                ProgressReply::Count(count) => Ok(HttpResponse::json(
                    StatusCode::OK,
                    &json!({"pending_jobs": count}),
                )),
                ProgressReply::Status(status) => Ok(HttpResponse::json(
                    status,
                    &json!({"detail": "progress unavailable"}),
                )),
                ProgressReply::Offline => Err(NetworkError::Connect("connection reset".into())),
            };
        }

        if let Some(response) = self.overrides.get(path) {
            return Ok(response.clone());
        }

        Ok(HttpResponse::json(
            StatusCode::OK,
            &json!({
                "method": request.method.as_str(),
                "path": path,
                "body": request.json_body(),
            }),
        ))
    }
}

fn invalid_token(status: StatusCode) -> HttpResponse {
    HttpResponse::json(
        status,
        &json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
    )
}

#[async_trait]
impl HttpTransport for FakeServer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let path = request
            .url
            .strip_prefix(SERVER)
            .unwrap_or(&request.url)
            .to_string();

        let latency = {
            let mut state = self.state.lock();
            state.requests.push(RecordedRequest {
                method: request.method.clone(),
                path: path.clone(),
                bearer: request.bearer_token().map(str::to_owned),
                content_type: request.content_type().map(str::to_owned),
                body: request.json_body(),
            });
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        if state.offline {
            return Err(NetworkError::Connect("server unreachable".into()));
        }
        match (request.method.clone(), path.as_str()) {
            (Method::POST, TOKEN_PATH) => Ok(state.login(&request)),
            (Method::POST, REFRESH_PATH) => state.refresh(&request),
            _ => state.resource(&request, &path),
        }
    }
}

pub fn config() -> ClientConfig {
    ClientConfig::for_server(SERVER).expect("test config")
}

/// Client with an empty session
pub async fn client(server: &FakeServer) -> (AutotClient, MemoryStorage) {
    let storage = MemoryStorage::new();
    let client = AutotClient::with_parts(config(), Arc::new(server.clone()), Arc::new(storage.clone()))
        .await
        .expect("client");
    (client, storage)
}

/// Client restored from a stored `access`/`refresh` pair
pub async fn logged_in_client(
    server: &FakeServer,
    access: &str,
    refresh: &str,
) -> (AutotClient, MemoryStorage) {
    let storage = MemoryStorage::new();
    storage
        .set_many(&[(ACCESS_TOKEN_KEY, access), (REFRESH_TOKEN_KEY, refresh)])
        .await
        .expect("seed storage");
    let client = AutotClient::with_parts(config(), Arc::new(server.clone()), Arc::new(storage.clone()))
        .await
        .expect("client");
    (client, storage)
}

pub async fn stored(storage: &MemoryStorage) -> (Option<String>, Option<String>) {
    (
        storage.get(ACCESS_TOKEN_KEY).await.expect("read access"),
        storage.get(REFRESH_TOKEN_KEY).await.expect("read refresh"),
    )
}

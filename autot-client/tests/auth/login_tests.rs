use autot_client::model::Credentials;
use autot_client::{ApiError, ApiPayload, NetworkError};
use reqwest::{Method, StatusCode};
use serde_json::json;

use crate::common::{FakeServer, REFRESH_PATH, TOKEN_PATH, client, stored};

#[tokio::test]
async fn login_then_expired_access_token_refreshes_once() {
    let server = FakeServer::new()
        .with_user("a", "b")
        .login_returns("t1", "r1");
    server.grant_refresh("r1", "t2");
    let (client, storage) = client(&server).await;

    client
        .api
        .login(&Credentials::new("a", "b"))
        .await
        .expect("login succeeds");
    assert_eq!(stored(&storage).await, (Some("t1".into()), Some("r1".into())));

    server.revoke_access("t1");
    let payload = client.api.get("keyword/").await.expect("retried GET succeeds");
    assert_eq!(
        payload.as_json().and_then(|v| v["path"].as_str()),
        Some("/api/keyword/")
    );

    let requests = server.requests();
    let login = &requests[0];
    assert_eq!(login.path, TOKEN_PATH);
    assert_eq!(login.body, Some(json!({"username": "a", "password": "b"})));
    assert_eq!(login.bearer, None);

    let refreshes: Vec<_> = requests.iter().filter(|r| r.path == REFRESH_PATH).collect();
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].body, Some(json!({"refresh": "r1"})));

    let gets: Vec<_> = requests
        .iter()
        .filter(|r| r.method == Method::GET && r.path == "/api/keyword/")
        .collect();
    assert_eq!(gets.len(), 2);
    assert_eq!(gets[0].bearer.as_deref(), Some("t1"));
    assert_eq!(gets[1].bearer.as_deref(), Some("t2"));
}

#[tokio::test]
async fn failed_login_publishes_server_detail() {
    let server = FakeServer::new()
        .with_user("a", "b")
        .login_returns("t1", "r1");
    let (client, storage) = client(&server).await;

    let err = client
        .api
        .login(&Credentials::new("a", "wrong"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    assert_eq!(
        client.api.error().as_deref(),
        Some("No active account found with the given credentials")
    );
    assert!(!client.api.is_logged_in());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn unreachable_server_gives_generic_login_message() {
    let server = FakeServer::new();
    server.set_offline(true);
    let (client, _storage) = client(&server).await;

    let err = client
        .api
        .login(&Credentials::new("a", "b"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Network(NetworkError::Connect(_))));
    assert_eq!(client.api.error().as_deref(), Some("Failed to login"));
}

#[tokio::test]
async fn logout_clears_session_and_storage() {
    let server = FakeServer::new()
        .with_user("a", "b")
        .login_returns("t1", "r1");
    let (client, storage) = client(&server).await;
    client.api.login(&Credentials::new("a", "b")).await.unwrap();
    assert_eq!(
        client.api.get("keyword/").await.unwrap(),
        ApiPayload::Json(json!({"method": "GET", "path": "/api/keyword/", "body": null}))
    );

    client.api.logout().await;
    client.api.logout().await;

    assert!(!client.api.is_logged_in());
    assert_eq!(stored(&storage).await, (None, None));
}

use std::sync::Arc;

use autot_client::domains::auth::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use autot_client::model::TokenPair;
use autot_client::{
    AutotClient, FileStorage, KeyValueStorage, MemoryStorage, SessionState, TokenStore,
};
use tempfile::TempDir;

use crate::common::{FakeServer, config};

const REFRESH_URL: &str = "http://media.test/auth/token/refresh/";

async fn reload(storage: Arc<dyn KeyValueStorage>) -> TokenStore {
    TokenStore::load(storage, Arc::new(FakeServer::new()), REFRESH_URL)
        .await
        .expect("load")
}

#[tokio::test]
async fn token_pair_survives_reload() {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let store = reload(Arc::clone(&storage)).await;
    let pair = TokenPair::new("t1", "r1").unwrap();

    store.set_token_pair(pair.clone()).await.expect("persist");

    let reloaded = reload(Arc::clone(&storage)).await;
    assert_eq!(reloaded.session_state(), SessionState::LoggedIn(pair));

    store.clear().await;
    let reloaded = reload(storage).await;
    assert_eq!(reloaded.session_state(), SessionState::LoggedOut);
    assert_eq!(reloaded.access_token(), None);
}

#[tokio::test]
async fn file_backed_session_survives_reload() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("session.json");
    let pair = TokenPair::new("t1", "r1").unwrap();

    let store = reload(Arc::new(FileStorage::with_path(&path))).await;
    store.set_token_pair(pair.clone()).await.expect("persist");
    store.set_access_token("t2".into()).await.expect("update access");

    let reloaded = reload(Arc::new(FileStorage::with_path(&path))).await;
    assert_eq!(reloaded.access_token().as_deref(), Some("t2"));
    assert_eq!(
        reloaded.session_state().refresh_token(),
        Some(pair.refresh())
    );

    reloaded.clear().await;
    let reloaded = reload(Arc::new(FileStorage::with_path(&path))).await;
    assert!(!reloaded.is_logged_in());
}

#[tokio::test]
async fn partial_pair_is_discarded() {
    let storage = MemoryStorage::new();
    storage.set(ACCESS_TOKEN_KEY, "t1").await.unwrap();

    let store = reload(Arc::new(storage.clone())).await;

    assert!(!store.is_logged_in());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn malformed_stored_token_is_discarded() {
    let storage = MemoryStorage::new();
    storage
        .set_many(&[(ACCESS_TOKEN_KEY, "t1"), (REFRESH_TOKEN_KEY, "not a token")])
        .await
        .unwrap();

    let store = reload(Arc::new(storage.clone())).await;

    assert!(!store.is_logged_in());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn corrupted_session_file_starts_logged_out() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("session.json");
    std::fs::write(&path, "{truncated").unwrap();
    let server = FakeServer::new();

    let client = AutotClient::with_parts(
        config(),
        Arc::new(server.clone()),
        Arc::new(FileStorage::with_path(&path)),
    )
    .await
    .expect("client starts despite unreadable session file");

    assert!(!client.api.is_logged_in());
    assert!(server.requests().is_empty());

    let storage = FileStorage::with_path(&path);
    assert_eq!(storage.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
    assert_eq!(storage.get(REFRESH_TOKEN_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn set_access_token_requires_a_session() {
    let store = reload(Arc::new(MemoryStorage::new())).await;
    assert!(store.set_access_token("t2".into()).await.is_err());
    assert!(!store.is_logged_in());
}

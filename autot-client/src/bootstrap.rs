use std::sync::Arc;

use autot_model::routes;
use log::info;

use crate::config::ClientConfig;
use crate::domains::auth::storage::{FileStorage, KeyValueStorage};
use crate::domains::auth::token_store::TokenStore;
use crate::domains::progress::poller::ProgressPoller;
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::errors::BootstrapError;
use crate::infrastructure::transport::{HttpTransport, ReqwestTransport};

/// The request client and progress poller sharing one session.
#[derive(Clone, Debug)]
pub struct AutotClient {
    pub api: ApiClient,
    pub progress: ProgressPoller,
}

impl AutotClient {
    /// Wire the production transport and session file from `config`.
    ///
    /// The poller is created stopped; call `progress.start()` once a session
    /// exists.
    pub async fn connect(config: ClientConfig) -> Result<Self, BootstrapError> {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout)?);
        let storage = match &config.session_file {
            Some(path) => FileStorage::with_path(path),
            None => FileStorage::new()?,
        };
        info!("[Bootstrap] Session file: {}", storage.path().display());

        Self::with_parts(config, transport, Arc::new(storage)).await
    }

    /// Wire a client from explicit collaborators, restoring any stored
    /// session.
    pub async fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, BootstrapError> {
        let refresh_url = config.auth_url(routes::auth::TOKEN_REFRESH);
        let tokens = TokenStore::load(storage, Arc::clone(&transport), refresh_url).await?;
        let poll_interval = config.poll_interval;
        let api = ApiClient::new(config, transport, tokens);
        let progress = ProgressPoller::new(Arc::new(api.clone()), poll_interval);

        Ok(Self { api, progress })
    }
}

//! services/admin/src/app/state.rs
//!
//! Wires the adapters, the shared client and the session manager together.

use crate::adapters::{FileStore, ReqwestTransport};
use crate::app::client::ApiClient;
use crate::app::session::SessionManager;
use crate::config::Config;
use crate::error::AdminError;
use std::sync::Arc;
use tracing::info;

//=========================================================================================
// AppState (Shared Across All Views)
//=========================================================================================

/// Created once at startup. Views clone `api` into their own collections.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub api: ApiClient,
    pub session: Arc<SessionManager>,
}

impl AppState {
    pub fn from_config(config: Arc<Config>) -> Result<Self, AdminError> {
        let transport = ReqwestTransport::new(config.api_url.clone(), config.request_timeout)?;
        let store = FileStore::new(config.token_store_path.clone());
        info!(
            api_url = %config.api_url,
            token_store = %config.token_store_path.display(),
            "Client configured"
        );

        let api = ApiClient::new(Arc::new(transport));
        let session = Arc::new(SessionManager::new(api.clone(), Arc::new(store)));
        Ok(Self {
            config,
            api,
            session,
        })
    }
}

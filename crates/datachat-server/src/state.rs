//! Shared application state.

use crate::config::Config;
use datachat_core::{ChatStore, ModelClient};
use std::sync::Arc;

/// Shared application state. The store is shared across all turns; the
/// model client is cheap to clone per request.
pub struct AppState {
    pub store: Arc<ChatStore>,
    pub model: ModelClient,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> datachat_core::Result<Self> {
        let store = Arc::new(ChatStore::open(&config.db_path)?);
        std::fs::create_dir_all(&config.upload_dir)?;
        let model = ModelClient::new(config.model_url.clone(), config.model_name.clone());

        Ok(Self {
            store,
            model,
            config,
        })
    }
}

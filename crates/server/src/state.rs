use std::sync::Arc;
use hashdex_core::{Config, SanitizedConfig, TorrentIndex};

/// Shared application state
pub struct AppState {
    config: Config,
    index: Arc<dyn TorrentIndex>,
}

impl AppState {
    pub fn new(config: Config, index: Arc<dyn TorrentIndex>) -> Self {
        Self { config, index }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn index(&self) -> &dyn TorrentIndex {
        self.index.as_ref()
    }
}

//! Application state for the browser service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::registry::ConnectionRegistry;
use crate::service::BrowserService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, registry: Arc<ConnectionRegistry>) -> Self {
        Self { config, registry }
    }

    /// Service bound to this state's registry.
    pub fn service(&self) -> BrowserService {
        BrowserService::new(Arc::clone(&self.registry), self.config.default_page_size)
    }
}

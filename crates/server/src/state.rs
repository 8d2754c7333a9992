//! Application state shared across handlers.

use crate::registry::EntityRegistry;
use std::sync::Arc;
use stow_core::config::AppConfig;
use stow_storage::InstanceStore;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Persistence backend for received instances.
    pub store: Arc<dyn InstanceStore>,
    /// Application entities allowed to receive objects.
    pub registry: Arc<EntityRegistry>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: AppConfig, store: Arc<dyn InstanceStore>) -> Self {
        let registry = Arc::new(EntityRegistry::from_config(&config.entities));
        Self {
            config: Arc::new(config),
            store,
            registry,
        }
    }
}

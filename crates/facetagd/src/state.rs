use crate::config::Config;
use facetag_core::{IdentityMemory, IdentityResolver, Models};
use std::sync::Arc;
use std::time::Instant;

/// Shared daemon state handed to every request.
pub struct AppState {
    pub started_at: Instant,
    pub config: Config,
    pub resolver: Arc<IdentityResolver>,
}

impl AppState {
    /// Build state with lazily initialized models from `config`.
    pub fn new(config: Config) -> Self {
        let models = Arc::new(Models::new(config.model_paths()));
        Self::with_models(config, models)
    }

    /// Build state around an existing model capability.
    pub fn with_models(config: Config, models: Arc<Models>) -> Self {
        let memory = Arc::new(IdentityMemory::new(config.memory_config()));
        let resolver = IdentityResolver::new(models, memory, config.resolver_settings());
        Self {
            started_at: Instant::now(),
            config,
            resolver: Arc::new(resolver),
        }
    }

    pub fn memory(&self) -> &Arc<IdentityMemory> {
        self.resolver.memory()
    }

    pub fn models(&self) -> &Arc<Models> {
        self.resolver.models()
    }
}

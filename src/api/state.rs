use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::{CatalogStore, InteractionSource};
use crate::registry::ModelRegistry;
use crate::services::model_cache::ModelCache;
use crate::services::scorer::RecommendationScorer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub interactions: Arc<dyn InteractionSource>,
    pub registry: Arc<dyn ModelRegistry>,
    pub model_cache: Arc<ModelCache>,
    pub scorer: Arc<RecommendationScorer>,
}

impl AppState {
    /// Wires the model cache and scorer onto the given stores
    pub fn new(
        config: Config,
        interactions: Arc<dyn InteractionSource>,
        catalog: Arc<dyn CatalogStore>,
        registry: Arc<dyn ModelRegistry>,
    ) -> Self {
        let model_cache = Arc::new(ModelCache::new(
            registry.clone(),
            config.experiment_name.clone(),
            Duration::from_secs(config.model_staleness_secs),
        ));
        let scorer = Arc::new(RecommendationScorer::new(model_cache.clone(), catalog));

        Self {
            config: Arc::new(config),
            interactions,
            registry,
            model_cache,
            scorer,
        }
    }
}

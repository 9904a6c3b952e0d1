//! Single-slot cache over the latest finished registry run.
//!
//! Serving never blocks on the registry: the cached snapshot is returned
//! immediately and a refresh only happens once the staleness budget has
//! elapsed. Only one task refreshes at a time; concurrent callers that lose
//! the race serve whatever is cached, stale included.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::Array2;
use tokio::sync::{Mutex, RwLock};

use crate::error::{AppError, AppResult};
use crate::models::ModelMetadata;
use crate::registry::{
    ModelRegistry, METADATA_ARTIFACT, MOVIE_FEATURES_ARTIFACT, USER_FEATURES_ARTIFACT,
};

/// An immutable, fully loaded model ready for inference
pub struct ModelSnapshot {
    pub run_id: String,
    pub w: Array2<f64>,
    pub h: Array2<f64>,
    pub metadata: ModelMetadata,
}

impl ModelSnapshot {
    /// Row index of the user in the factor matrix, if the user was in training
    pub fn user_index(&self, user_id: i64) -> Option<usize> {
        self.metadata.user_ids.iter().position(|&id| id == user_id)
    }
}

#[derive(Default)]
struct CacheSlot {
    snapshot: Option<Arc<ModelSnapshot>>,
    last_checked: Option<Instant>,
}

pub struct ModelCache {
    registry: Arc<dyn ModelRegistry>,
    experiment_name: String,
    staleness_budget: Duration,
    slot: RwLock<CacheSlot>,
    refresh_lock: Mutex<()>,
}

impl ModelCache {
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        experiment_name: String,
        staleness_budget: Duration,
    ) -> Self {
        Self {
            registry,
            experiment_name,
            staleness_budget,
            slot: RwLock::new(CacheSlot::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn preloaded(snapshot: ModelSnapshot) -> Self {
        use crate::registry::MockModelRegistry;

        Self {
            registry: Arc::new(MockModelRegistry::new()),
            experiment_name: "test".to_string(),
            staleness_budget: Duration::from_secs(3600),
            slot: RwLock::new(CacheSlot {
                snapshot: Some(Arc::new(snapshot)),
                last_checked: Some(Instant::now()),
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The current snapshot, refreshing first only when the budget elapsed.
    ///
    /// Returns `None` when no finished run has ever been loaded.
    pub async fn get(&self) -> Option<Arc<ModelSnapshot>> {
        {
            let slot = self.slot.read().await;
            if let Some(last_checked) = slot.last_checked {
                if last_checked.elapsed() < self.staleness_budget {
                    return slot.snapshot.clone();
                }
            }
        }

        // Single-flight: losers of the race serve the possibly stale slot
        if let Ok(_guard) = self.refresh_lock.try_lock() {
            self.refresh().await;
        }

        self.slot.read().await.snapshot.clone()
    }

    /// The cached snapshot without any freshness check or registry traffic
    pub async fn peek(&self) -> Option<Arc<ModelSnapshot>> {
        self.slot.read().await.snapshot.clone()
    }

    async fn refresh(&self) {
        let latest = match self
            .registry
            .latest_finished_run(&self.experiment_name)
            .await
        {
            Ok(Some(run)) => run,
            Ok(None) => {
                // No finished run yet; leave last_checked alone so the next
                // call retries immediately
                tracing::debug!("No finished training run in registry");
                return;
            }
            Err(error) => {
                tracing::warn!(error = %error, "Registry check failed, keeping cached model");
                return;
            }
        };

        let cached_run_id = {
            let slot = self.slot.read().await;
            slot.snapshot.as_ref().map(|s| s.run_id.clone())
        };

        if cached_run_id.as_deref() == Some(latest.run_id.as_str()) {
            let mut slot = self.slot.write().await;
            slot.last_checked = Some(Instant::now());
            return;
        }

        match self.load_snapshot(&latest.run_id).await {
            Ok(snapshot) => {
                tracing::info!(run_id = %latest.run_id, "Loaded new model snapshot");
                let mut slot = self.slot.write().await;
                slot.snapshot = Some(Arc::new(snapshot));
                slot.last_checked = Some(Instant::now());
            }
            Err(error) => {
                tracing::error!(
                    run_id = %latest.run_id,
                    error = %error,
                    "Failed to load model artifacts, keeping cached model"
                );
            }
        }
    }

    async fn load_snapshot(&self, run_id: &str) -> AppResult<ModelSnapshot> {
        let w = self.load_factor(run_id, USER_FEATURES_ARTIFACT).await?;
        let h = self.load_factor(run_id, MOVIE_FEATURES_ARTIFACT).await?;

        let metadata_bytes = self
            .registry
            .download_artifact(run_id, METADATA_ARTIFACT)
            .await?;
        let metadata: ModelMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| AppError::ArtifactLoad(format!("{}: {}", METADATA_ARTIFACT, e)))?;

        Ok(ModelSnapshot {
            run_id: run_id.to_string(),
            w,
            h,
            metadata,
        })
    }

    async fn load_factor(&self, run_id: &str, path: &str) -> AppResult<Array2<f64>> {
        let bytes = self.registry.download_artifact(run_id, path).await?;
        let matrix: crate::models::FactorMatrix = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::ArtifactLoad(format!("{}: {}", path, e)))?;
        matrix
            .into_array()
            .map_err(|e| AppError::ArtifactLoad(format!("{}: {}", path, e)))
    }
}

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::RunInfo;

pub mod mlflow;

pub use mlflow::MlflowRegistry;

/// Artifact paths shared by the trainer and the model cache
pub const USER_FEATURES_ARTIFACT: &str = "user_features.json";
pub const MOVIE_FEATURES_ARTIFACT: &str = "movie_features.json";
pub const METADATA_ARTIFACT: &str = "metadata.json";

/// Model registry abstraction
///
/// The trainer publishes runs through this trait and the model cache reads
/// them back. Runs are write-once: only a run that reached `finish_run` is
/// ever returned by `latest_finished_run`, so a partially written run can
/// never be served.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Resolves an experiment id by name, creating the experiment if needed
    async fn ensure_experiment(&self, name: &str) -> AppResult<String>;

    /// The single most recently created FINISHED run in the experiment
    async fn latest_finished_run(&self, experiment: &str) -> AppResult<Option<RunInfo>>;

    /// Raw bytes of one artifact of a run
    async fn download_artifact(&self, run_id: &str, path: &str) -> AppResult<Vec<u8>>;

    /// Opens a new run in RUNNING state and returns its id
    async fn create_run(&self, experiment_id: &str, run_name: &str) -> AppResult<String>;

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> AppResult<()>;

    async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> AppResult<()>;

    async fn log_artifact(&self, run_id: &str, path: &str, bytes: Vec<u8>) -> AppResult<()>;

    /// Marks the run FINISHED, making it visible to `latest_finished_run`
    async fn finish_run(&self, run_id: &str) -> AppResult<()>;

    /// Marks the run FAILED; failed runs are never served
    async fn fail_run(&self, run_id: &str) -> AppResult<()>;
}

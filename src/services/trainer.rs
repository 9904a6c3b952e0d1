//! Non-negative matrix factorization by multiplicative updates.
//!
//! Factors V (users x movies) into W (users x k) and H (k x movies) with the
//! Lee-Seung update rules. Initialization is seeded, so a given matrix and
//! config always yield the same factors.

use chrono::Utc;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AppResult;
use crate::models::{FactorMatrix, Hyperparameters, ModelMetadata, TrainingMetrics};
use crate::registry::{
    ModelRegistry, METADATA_ARTIFACT, MOVIE_FEATURES_ARTIFACT, USER_FEATURES_ARTIFACT,
};
use crate::services::matrix::InteractionMatrix;

/// Guards divisions in the update rules against zero denominators
const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct NmfConfig {
    pub max_components: usize,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for NmfConfig {
    fn default() -> Self {
        Self {
            max_components: 10,
            max_iter: 200,
            seed: 42,
        }
    }
}

/// A trained factorization together with everything the registry records
pub struct NmfModel {
    pub w: Array2<f64>,
    pub h: Array2<f64>,
    pub hyperparameters: Hyperparameters,
    pub metrics: TrainingMetrics,
    pub user_ids: Vec<i64>,
    pub movie_ids: Vec<i64>,
    pub trained_at: chrono::DateTime<Utc>,
}

/// Effective rank: capped by config and by the smaller matrix dimension
fn component_count(matrix: &InteractionMatrix, config: &NmfConfig) -> usize {
    let smaller_dim = matrix.num_users().min(matrix.num_movies());
    config.max_components.min(smaller_dim.saturating_sub(1)).max(1)
}

/// Runs the factorization to completion.
///
/// Infallible: `InteractionMatrix::build` already enforced the minimum
/// dimensions, and every update preserves non-negativity.
pub fn train(matrix: &InteractionMatrix, config: &NmfConfig) -> NmfModel {
    let v = matrix.values();
    let (num_users, num_movies) = v.dim();
    let k = component_count(matrix, config);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mean = v.mean().unwrap_or(0.0).max(EPSILON);
    let scale = (mean / k as f64).sqrt();

    let mut w = Array2::from_shape_fn((num_users, k), |_| rng.gen::<f64>() * scale);
    let mut h = Array2::from_shape_fn((k, num_movies), |_| rng.gen::<f64>() * scale);

    for _ in 0..config.max_iter {
        // H <- H * (W^T V) / (W^T W H + eps)
        let wt = w.t();
        let numerator = wt.dot(v);
        let denominator = wt.dot(&w).dot(&h) + EPSILON;
        h = h * (numerator / denominator);

        // W <- W * (V H^T) / (W H H^T + eps)
        let ht = h.t();
        let numerator = v.dot(&ht);
        let denominator = w.dot(&h).dot(&ht) + EPSILON;
        w = w * (numerator / denominator);
    }

    let metrics = compute_metrics(v, &w, &h, matrix.sparsity());

    NmfModel {
        w,
        h,
        hyperparameters: Hyperparameters {
            n_components: k,
            max_iter: config.max_iter,
            seed: config.seed,
        },
        metrics,
        user_ids: matrix.user_ids().to_vec(),
        movie_ids: matrix.movie_ids().to_vec(),
        trained_at: Utc::now(),
    }
}

/// Fit metrics over the full dense reconstruction, zeros included
fn compute_metrics(
    v: &Array2<f64>,
    w: &Array2<f64>,
    h: &Array2<f64>,
    sparsity: f64,
) -> TrainingMetrics {
    let reconstruction = w.dot(h);
    let diff = v - &reconstruction;
    let n = v.len() as f64;

    let sum_squares: f64 = diff.iter().map(|d| d * d).sum();
    let sum_abs: f64 = diff.iter().map(|d| d.abs()).sum();

    TrainingMetrics {
        rmse: (sum_squares / n).sqrt(),
        mae: sum_abs / n,
        reconstruction_error: sum_squares.sqrt(),
        sparsity,
    }
}

/// Publishes a trained model as a new registry run and returns the run id.
///
/// The run only becomes visible to readers once `finish_run` succeeds; any
/// failure along the way marks the run FAILED best-effort and propagates.
pub async fn publish_run(
    registry: &dyn ModelRegistry,
    experiment_name: &str,
    model: &NmfModel,
) -> AppResult<String> {
    let experiment_id = registry.ensure_experiment(experiment_name).await?;
    let run_name = model.trained_at.format("training_%Y%m%d_%H%M%S").to_string();
    let run_id = registry.create_run(&experiment_id, &run_name).await?;

    if let Err(error) = log_run_contents(registry, &run_id, model).await {
        tracing::error!(run_id = %run_id, error = %error, "Publishing run failed");
        if let Err(fail_error) = registry.fail_run(&run_id).await {
            tracing::warn!(run_id = %run_id, error = %fail_error, "Could not mark run as failed");
        }
        return Err(error);
    }

    registry.finish_run(&run_id).await?;

    tracing::info!(
        run_id = %run_id,
        rmse = model.metrics.rmse,
        mae = model.metrics.mae,
        "Published training run"
    );

    Ok(run_id)
}

async fn log_run_contents(
    registry: &dyn ModelRegistry,
    run_id: &str,
    model: &NmfModel,
) -> AppResult<()> {
    let num_users = model.user_ids.len();
    let num_movies = model.movie_ids.len();

    registry.log_param(run_id, "algorithm", "nmf").await?;
    registry
        .log_param(
            run_id,
            "n_components",
            &model.hyperparameters.n_components.to_string(),
        )
        .await?;
    registry
        .log_param(run_id, "max_iter", &model.hyperparameters.max_iter.to_string())
        .await?;
    registry
        .log_param(run_id, "random_state", &model.hyperparameters.seed.to_string())
        .await?;
    registry
        .log_param(run_id, "num_users", &num_users.to_string())
        .await?;
    registry
        .log_param(run_id, "num_movies", &num_movies.to_string())
        .await?;
    registry
        .log_param(
            run_id,
            "matrix_shape",
            &format!("{}x{}", num_users, num_movies),
        )
        .await?;

    registry.log_metric(run_id, "rmse", model.metrics.rmse).await?;
    registry.log_metric(run_id, "mae", model.metrics.mae).await?;
    registry
        .log_metric(
            run_id,
            "reconstruction_error",
            model.metrics.reconstruction_error,
        )
        .await?;
    registry
        .log_metric(run_id, "sparsity", model.metrics.sparsity)
        .await?;

    let user_features = serde_json::to_vec(&FactorMatrix::from_array(&model.w))
        .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
    let movie_features = serde_json::to_vec(&FactorMatrix::from_array(&model.h))
        .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;
    let metadata = serde_json::to_vec(&ModelMetadata {
        n_components: model.hyperparameters.n_components,
        user_ids: model.user_ids.clone(),
        movie_ids: model.movie_ids.clone(),
        training_date: model.trained_at,
        rmse: model.metrics.rmse,
        mae: model.metrics.mae,
        num_users,
        num_movies,
    })
    .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;

    registry
        .log_artifact(run_id, USER_FEATURES_ARTIFACT, user_features)
        .await?;
    registry
        .log_artifact(run_id, MOVIE_FEATURES_ARTIFACT, movie_features)
        .await?;
    registry
        .log_artifact(run_id, METADATA_ARTIFACT, metadata)
        .await?;

    Ok(())
}

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{Recommendation, RecommendationSource};
use crate::services::training::{run_training_cycle_with_timeout, TrainingReport};

use super::AppState;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 100;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct RecommendationParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub user_id: i64,
    pub count: usize,
    pub source: RecommendationSource,
    pub data: Vec<Recommendation>,
}

#[derive(Debug, Serialize)]
pub struct TrainingResponse {
    pub status: String,
    pub message: String,
    #[serde(flatten)]
    pub report: TrainingReport,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Ranked recommendations for a user, model-backed when possible
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(params): Query<RecommendationParams>,
) -> AppResult<Json<RecommendationResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit > MAX_LIMIT {
        return Err(AppError::InvalidInput(format!(
            "limit must be at most {}",
            MAX_LIMIT
        )));
    }

    let data = state.scorer.recommend(user_id, limit).await?;

    let source = data
        .first()
        .map(|r| r.source)
        .unwrap_or(RecommendationSource::Fallback);

    Ok(Json(RecommendationResponse {
        user_id,
        count: data.len(),
        source,
        data,
    }))
}

/// Runs one full training cycle synchronously and reports the published run
pub async fn trigger_training(
    State(state): State<AppState>,
) -> AppResult<Json<TrainingResponse>> {
    let timeout = Duration::from_secs(state.config.training_timeout_secs);

    let report = run_training_cycle_with_timeout(
        state.interactions.as_ref(),
        state.registry.as_ref(),
        &state.config.experiment_name,
        &state.config.nmf(),
        timeout,
    )
    .await?;

    Ok(Json(TrainingResponse {
        status: "ok".to_string(),
        message: format!(
            "Trained on {} users and {} movies",
            report.num_users, report.num_movies
        ),
        report,
    }))
}

/// Reports whatever model is currently cached, without touching the registry
pub async fn model_status(State(state): State<AppState>) -> Json<Value> {
    match state.model_cache.peek().await {
        Some(snapshot) => Json(json!({
            "loaded": true,
            "run_id": snapshot.run_id,
            "n_components": snapshot.metadata.n_components,
            "num_users": snapshot.metadata.num_users,
            "num_movies": snapshot.metadata.num_movies,
            "training_date": snapshot.metadata.training_date,
            "rmse": snapshot.metadata.rmse,
            "mae": snapshot.metadata.mae,
        })),
        None => Json(json!({ "loaded": false })),
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("No interaction data available for training")]
    NoInteractionData,

    #[error("Insufficient data dimensions: {0}")]
    Dimension(String),

    #[error("Failed to load model artifact: {0}")]
    ArtifactLoad(String),

    #[error("Model registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Training exceeded {0}s time limit")]
    TrainingTimeout(u64),

    #[error("Training failed: {0}")]
    TrainingFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NoInteractionData | AppError::Dimension(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::RegistryUnavailable(_)
            | AppError::ArtifactLoad(_)
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::TrainingTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Database(_)
            | AppError::Inference(_)
            | AppError::TrainingFailure(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        } else {
            tracing::warn!(error = %message, "Request rejected");
        }

        let body = Json(json!({
            "status": "error",
            "error": message,
        }));

        (status, body).into_response()
    }
}

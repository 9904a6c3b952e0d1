//! Two-tier recommendation policy.
//!
//! The model path scores every candidate movie from the cached factors and
//! normalizes within the truncated top-N. Anything that prevents a model
//! answer (no model yet, user unseen at training time, shape mismatch, or an
//! empty candidate set) falls back to the popularity ranking, so a request
//! only fails when both tiers fail.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::CatalogStore;
use crate::error::{AppError, AppResult};
use crate::models::{Recommendation, RecommendationSource};
use crate::services::model_cache::{ModelCache, ModelSnapshot};

/// Upper bound of the normalized score scale
const SCORE_CEILING: f64 = 5.0;

/// Which branch the request took; drives logging and the fallback decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScorePath {
    Model,
    NoModel,
    ColdStart,
    InferenceError,
}

pub struct RecommendationScorer {
    cache: Arc<ModelCache>,
    catalog: Arc<dyn CatalogStore>,
}

impl RecommendationScorer {
    pub fn new(cache: Arc<ModelCache>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { cache, catalog }
    }

    pub async fn recommend(&self, user_id: i64, limit: usize) -> AppResult<Vec<Recommendation>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let watched = self.catalog.watched_movies(user_id).await?;

        let (path, model_result) = match self.cache.get().await {
            None => (ScorePath::NoModel, None),
            Some(snapshot) => match snapshot.user_index(user_id) {
                None => (ScorePath::ColdStart, None),
                Some(_) => match score_with_model(&snapshot, user_id, &watched, limit) {
                    Ok(recommendations) => (ScorePath::Model, Some(recommendations)),
                    Err(error) => {
                        tracing::error!(user_id, error = %error, "Model inference failed");
                        (ScorePath::InferenceError, None)
                    }
                },
            },
        };

        match (path, model_result) {
            (ScorePath::Model, Some(recommendations)) if !recommendations.is_empty() => {
                Ok(recommendations)
            }
            (path, _) => {
                tracing::debug!(user_id, ?path, "Serving popularity fallback");
                self.fallback(&watched, limit).await
            }
        }
    }

    async fn fallback(
        &self,
        watched: &HashSet<i64>,
        limit: usize,
    ) -> AppResult<Vec<Recommendation>> {
        let popular = self.catalog.top_rated(watched, limit).await?;

        Ok(popular
            .into_iter()
            .enumerate()
            .map(|(i, movie)| Recommendation {
                movie_id: movie.movie_id,
                raw_score: movie.avg_rating,
                normalized_score: movie.avg_rating,
                rank: i + 1,
                source: RecommendationSource::Fallback,
            })
            .collect())
    }
}

/// Scores all unwatched movies for a user known to the model.
///
/// Normalization divides by the max raw score within the truncated top-N, so
/// the first item lands at exactly 5.0 whenever its raw score is positive.
/// A non-positive max yields all-zero normalized scores.
fn score_with_model(
    snapshot: &ModelSnapshot,
    user_id: i64,
    watched: &HashSet<i64>,
    limit: usize,
) -> AppResult<Vec<Recommendation>> {
    let row = snapshot
        .user_index(user_id)
        .ok_or_else(|| AppError::Inference(format!("user {} missing from factors", user_id)))?;

    let (w_rows, w_cols) = snapshot.w.dim();
    let (h_rows, h_cols) = snapshot.h.dim();
    if w_cols != h_rows {
        return Err(AppError::Inference(format!(
            "factor shapes disagree: W is {}x{}, H is {}x{}",
            w_rows, w_cols, h_rows, h_cols
        )));
    }
    if h_cols != snapshot.metadata.movie_ids.len() || w_rows != snapshot.metadata.user_ids.len() {
        return Err(AppError::Inference(
            "factor shapes disagree with metadata id lists".to_string(),
        ));
    }

    let scores = snapshot.w.row(row).dot(&snapshot.h);

    let mut scored: Vec<(i64, f64)> = snapshot
        .metadata
        .movie_ids
        .iter()
        .zip(scores.iter())
        .filter(|(movie_id, _)| !watched.contains(movie_id))
        .map(|(&movie_id, &score)| (movie_id, score))
        .collect();

    // Score descending, movie id ascending on ties
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);

    let max_score = scored
        .iter()
        .map(|(_, score)| *score)
        .fold(f64::NEG_INFINITY, f64::max);

    Ok(scored
        .into_iter()
        .enumerate()
        .map(|(i, (movie_id, raw_score))| Recommendation {
            movie_id,
            raw_score,
            normalized_score: if max_score > 0.0 {
                raw_score / max_score * SCORE_CEILING
            } else {
                0.0
            },
            rank: i + 1,
            source: RecommendationSource::Model,
        })
        .collect())
}

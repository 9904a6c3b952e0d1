use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Raw interaction signal read from the live store
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    /// The user watched the movie
    Watched { user_id: i64, movie_id: i64 },
    /// The user rated the movie, optionally marking it liked
    Rated {
        user_id: i64,
        movie_id: i64,
        rating: f64,
        liked: bool,
    },
}

impl InteractionEvent {
    /// The (user, movie) pair this event belongs to
    pub fn pair(&self) -> (i64, i64) {
        match self {
            InteractionEvent::Watched { user_id, movie_id } => (*user_id, *movie_id),
            InteractionEvent::Rated {
                user_id, movie_id, ..
            } => (*user_id, *movie_id),
        }
    }
}

/// One aggregated interaction score per distinct (user, movie) pair
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRecord {
    pub user_id: i64,
    pub movie_id: i64,
    pub score: f64,
}

/// Factorization hyperparameters recorded with every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_components: usize,
    pub max_iter: usize,
    pub seed: u64,
}

/// Fit-quality metrics computed over the full dense reconstruction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub reconstruction_error: f64,
    pub sparsity: f64,
}

/// Row-major dense matrix as stored in registry artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl FactorMatrix {
    pub fn from_array(array: &Array2<f64>) -> Self {
        let (rows, cols) = array.dim();
        Self {
            rows,
            cols,
            data: array.iter().copied().collect(),
        }
    }

    pub fn into_array(self) -> Result<Array2<f64>, ndarray::ShapeError> {
        Array2::from_shape_vec((self.rows, self.cols), self.data)
    }
}

/// Contents of the metadata artifact written alongside the factor matrices.
///
/// The identifier orderings are persisted verbatim so factor rows and columns
/// can be mapped back to user and movie ids at serving time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub n_components: usize,
    pub user_ids: Vec<i64>,
    pub movie_ids: Vec<i64>,
    pub training_date: DateTime<Utc>,
    pub rmse: f64,
    pub mae: f64,
    pub num_users: usize,
    pub num_movies: usize,
}

/// Identity of a finished run in the registry
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
}

/// Popularity row backing the fallback ranking
#[derive(Debug, Clone)]
pub struct PopularMovie {
    pub movie_id: i64,
    pub avg_rating: f64,
    pub imdb_rating: f64,
}

/// Which branch of the serving policy produced a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Model,
    Fallback,
}

/// A single ranked recommendation; request-scoped, never persisted
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub movie_id: i64,
    pub raw_score: f64,
    /// Bounded score in [0, 5]; on the model path the best-of-N item is
    /// exactly 5.0 whenever its raw score is positive
    pub normalized_score: f64,
    pub rank: usize,
    pub source: RecommendationSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_factor_matrix_round_trip() {
        let original = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let encoded = FactorMatrix::from_array(&original);

        assert_eq!(encoded.rows, 2);
        assert_eq!(encoded.cols, 3);
        assert_eq!(encoded.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let decoded = encoded.into_array().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_factor_matrix_rejects_bad_shape() {
        let bad = FactorMatrix {
            rows: 2,
            cols: 3,
            data: vec![1.0, 2.0],
        };
        assert!(bad.into_array().is_err());
    }

    #[test]
    fn test_recommendation_source_serde() {
        assert_eq!(
            serde_json::to_string(&RecommendationSource::Model).unwrap(),
            r#""model""#
        );
        assert_eq!(
            serde_json::to_string(&RecommendationSource::Fallback).unwrap(),
            r#""fallback""#
        );
    }

    #[test]
    fn test_interaction_event_pair() {
        let watched = InteractionEvent::Watched {
            user_id: 7,
            movie_id: 42,
        };
        let rated = InteractionEvent::Rated {
            user_id: 7,
            movie_id: 42,
            rating: 4.0,
            liked: true,
        };
        assert_eq!(watched.pair(), (7, 42));
        assert_eq!(rated.pair(), (7, 42));
    }
}

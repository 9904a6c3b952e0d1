//! Dense user-by-movie interaction matrix.
//!
//! Rows follow ascending user ids and columns ascending movie ids, the same
//! orderings persisted in the model metadata so serving can map factor rows
//! back to ids.

use ndarray::Array2;

use crate::error::{AppError, AppResult};
use crate::models::InteractionRecord;

pub struct InteractionMatrix {
    values: Array2<f64>,
    user_ids: Vec<i64>,
    movie_ids: Vec<i64>,
}

impl InteractionMatrix {
    /// Builds the dense matrix; pairs without a record stay zero.
    ///
    /// Factorization needs at least two users and two movies.
    pub fn build(records: &[InteractionRecord]) -> AppResult<Self> {
        let mut user_ids: Vec<i64> = records.iter().map(|r| r.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let mut movie_ids: Vec<i64> = records.iter().map(|r| r.movie_id).collect();
        movie_ids.sort_unstable();
        movie_ids.dedup();

        if user_ids.len() < 2 || movie_ids.len() < 2 {
            return Err(AppError::Dimension(format!(
                "need at least 2 users and 2 movies, got {} users and {} movies",
                user_ids.len(),
                movie_ids.len()
            )));
        }

        let mut values = Array2::zeros((user_ids.len(), movie_ids.len()));
        for record in records {
            if let (Ok(row), Ok(col)) = (
                user_ids.binary_search(&record.user_id),
                movie_ids.binary_search(&record.movie_id),
            ) {
                values[[row, col]] = record.score;
            }
        }

        Ok(Self {
            values,
            user_ids,
            movie_ids,
        })
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn user_ids(&self) -> &[i64] {
        &self.user_ids
    }

    pub fn movie_ids(&self) -> &[i64] {
        &self.movie_ids
    }

    pub fn num_users(&self) -> usize {
        self.user_ids.len()
    }

    pub fn num_movies(&self) -> usize {
        self.movie_ids.len()
    }

    /// Fraction of cells with no interaction
    pub fn sparsity(&self) -> f64 {
        let total = self.values.len();
        if total == 0 {
            return 0.0;
        }
        let zeros = self.values.iter().filter(|&&v| v == 0.0).count();
        zeros as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: i64, movie_id: i64, score: f64) -> InteractionRecord {
        InteractionRecord {
            user_id,
            movie_id,
            score,
        }
    }

    fn sample_records() -> Vec<InteractionRecord> {
        vec![
            record(1, 101, 6.0),
            record(1, 102, 4.0),
            record(2, 101, 5.0),
            record(2, 103, 2.0),
            record(3, 102, 3.0),
            record(3, 104, 1.0),
        ]
    }

    #[test]
    fn test_build_shape_and_orderings() {
        let matrix = InteractionMatrix::build(&sample_records()).unwrap();

        assert_eq!(matrix.values().dim(), (3, 4));
        assert_eq!(matrix.user_ids(), &[1, 2, 3]);
        assert_eq!(matrix.movie_ids(), &[101, 102, 103, 104]);
        assert_eq!(matrix.num_users(), 3);
        assert_eq!(matrix.num_movies(), 4);
    }

    #[test]
    fn test_build_places_scores() {
        let matrix = InteractionMatrix::build(&sample_records()).unwrap();
        let values = matrix.values();

        assert_eq!(values[[0, 0]], 6.0);
        assert_eq!(values[[0, 1]], 4.0);
        assert_eq!(values[[1, 0]], 5.0);
        assert_eq!(values[[1, 2]], 2.0);
        assert_eq!(values[[2, 1]], 3.0);
        assert_eq!(values[[2, 3]], 1.0);

        // Unobserved pairs stay zero
        assert_eq!(values[[0, 2]], 0.0);
        assert_eq!(values[[2, 0]], 0.0);
    }

    #[test]
    fn test_too_few_users_rejected() {
        let records = vec![record(1, 101, 3.0), record(1, 102, 4.0)];
        assert!(matches!(
            InteractionMatrix::build(&records),
            Err(AppError::Dimension(_))
        ));
    }

    #[test]
    fn test_too_few_movies_rejected() {
        let records = vec![record(1, 101, 3.0), record(2, 101, 4.0)];
        assert!(matches!(
            InteractionMatrix::build(&records),
            Err(AppError::Dimension(_))
        ));
    }

    #[test]
    fn test_sparsity() {
        let matrix = InteractionMatrix::build(&sample_records()).unwrap();
        // 6 observed cells out of 12
        assert!((matrix.sparsity() - 0.5).abs() < 1e-12);
    }
}

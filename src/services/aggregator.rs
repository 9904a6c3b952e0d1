//! Collapses raw interaction events into one score per (user, movie) pair.
//!
//! All folds are commutative, so the result is independent of event order:
//! ratings take the max, the watched and liked flags OR together.

use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::models::{InteractionEvent, InteractionRecord};

pub const WATCHED_WEIGHT: f64 = 1.0;
pub const LIKED_WEIGHT: f64 = 2.0;

#[derive(Debug, Default, Clone, Copy)]
struct PairSignals {
    watched: bool,
    liked: bool,
    max_rating: f64,
}

/// Aggregates events into interaction records sorted by (user_id, movie_id).
///
/// score = max(rating) + 2.0 if ever liked + 1.0 if ever watched
pub fn aggregate_events(events: &[InteractionEvent]) -> AppResult<Vec<InteractionRecord>> {
    if events.is_empty() {
        return Err(AppError::NoInteractionData);
    }

    let mut signals: HashMap<(i64, i64), PairSignals> = HashMap::new();

    for event in events {
        let entry = signals.entry(event.pair()).or_default();
        match event {
            InteractionEvent::Watched { .. } => {
                entry.watched = true;
            }
            InteractionEvent::Rated { rating, liked, .. } => {
                entry.max_rating = entry.max_rating.max(*rating);
                entry.liked = entry.liked || *liked;
            }
        }
    }

    let mut records: Vec<InteractionRecord> = signals
        .into_iter()
        .map(|((user_id, movie_id), pair)| {
            let mut score = pair.max_rating;
            if pair.liked {
                score += LIKED_WEIGHT;
            }
            if pair.watched {
                score += WATCHED_WEIGHT;
            }
            InteractionRecord {
                user_id,
                movie_id,
                score,
            }
        })
        .collect();

    records.sort_by_key(|record| (record.user_id, record.movie_id));

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watched(user_id: i64, movie_id: i64) -> InteractionEvent {
        InteractionEvent::Watched { user_id, movie_id }
    }

    fn rated(user_id: i64, movie_id: i64, rating: f64, liked: bool) -> InteractionEvent {
        InteractionEvent::Rated {
            user_id,
            movie_id,
            rating,
            liked,
        }
    }

    #[test]
    fn test_empty_events_rejected() {
        assert!(matches!(
            aggregate_events(&[]),
            Err(AppError::NoInteractionData)
        ));
    }

    #[test]
    fn test_signal_weights() {
        let records = aggregate_events(&[
            watched(1, 10),
            rated(1, 20, 4.0, false),
            rated(1, 30, 3.0, true),
            watched(1, 30),
        ])
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].score, 1.0);
        assert_eq!(records[1].score, 4.0);
        assert_eq!(records[2].score, 6.0);
    }

    #[test]
    fn test_repeated_ratings_take_max() {
        let records = aggregate_events(&[
            rated(1, 10, 2.0, false),
            rated(1, 10, 5.0, false),
            rated(1, 10, 3.0, false),
        ])
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, 5.0);
    }

    #[test]
    fn test_liked_flag_is_sticky() {
        let records = aggregate_events(&[
            rated(1, 10, 3.0, true),
            rated(1, 10, 5.0, false),
        ])
        .unwrap();

        assert_eq!(records[0].score, 7.0);
    }

    #[test]
    fn test_order_independence() {
        let mut events = vec![
            watched(2, 10),
            rated(1, 20, 4.0, true),
            rated(2, 10, 2.0, false),
            watched(1, 20),
            rated(1, 10, 5.0, false),
        ];

        let forward = aggregate_events(&events).unwrap();
        events.reverse();
        let reversed = aggregate_events(&events).unwrap();

        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_output_sorted_by_user_then_movie() {
        let records = aggregate_events(&[
            watched(2, 30),
            watched(1, 20),
            watched(2, 10),
            watched(1, 10),
        ])
        .unwrap();

        let pairs: Vec<(i64, i64)> = records
            .iter()
            .map(|record| (record.user_id, record.movie_id))
            .collect();
        assert_eq!(pairs, vec![(1, 10), (1, 20), (2, 10), (2, 30)]);
    }
}

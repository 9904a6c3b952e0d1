use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{InteractionEvent, PopularMovie};

pub mod postgres;

pub use postgres::create_pool;
pub use postgres::PgStore;

/// Bulk read of raw interaction events.
///
/// The source guarantees no ordering; the aggregator imposes determinism.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InteractionSource: Send + Sync {
    async fn fetch_events(&self) -> AppResult<Vec<InteractionEvent>>;
}

/// Read-only view of the live catalog used by the scorer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Movies the user has already watched
    async fn watched_movies(&self, user_id: i64) -> AppResult<HashSet<i64>>;

    /// Movies ranked by mean rating descending, with the static external
    /// rating as tie-break, excluding the given set
    async fn top_rated(
        &self,
        exclude: &HashSet<i64>,
        limit: usize,
    ) -> AppResult<Vec<PopularMovie>>;
}

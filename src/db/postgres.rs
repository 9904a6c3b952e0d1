use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::db::{CatalogStore, InteractionSource};
use crate::error::AppResult;
use crate::models::{InteractionEvent, PopularMovie};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed live store: interaction events, watched lookups and the
/// popularity fallback query
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct WatchedRow {
    user_id: i64,
    movie_id: i64,
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    user_id: i64,
    movie_id: i64,
    rating: f64,
    liked: bool,
}

#[derive(sqlx::FromRow)]
struct PopularRow {
    movie_id: i64,
    avg_rating: f64,
    imdb_rating: f64,
}

#[async_trait]
impl InteractionSource for PgStore {
    async fn fetch_events(&self) -> AppResult<Vec<InteractionEvent>> {
        let watched: Vec<WatchedRow> = sqlx::query_as(
            r#"
            SELECT user_id::BIGINT AS user_id, movie_id::BIGINT AS movie_id
            FROM watched_movies
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let ratings: Vec<RatingRow> = sqlx::query_as(
            r#"
            SELECT user_id::BIGINT AS user_id,
                   movie_id::BIGINT AS movie_id,
                   rating::DOUBLE PRECISION AS rating,
                   COALESCE(liked, FALSE) AS liked
            FROM ratings
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(watched.len() + ratings.len());
        for row in watched {
            events.push(InteractionEvent::Watched {
                user_id: row.user_id,
                movie_id: row.movie_id,
            });
        }
        for row in ratings {
            events.push(InteractionEvent::Rated {
                user_id: row.user_id,
                movie_id: row.movie_id,
                rating: row.rating,
                liked: row.liked,
            });
        }

        tracing::debug!(event_count = events.len(), "Fetched interaction events");

        Ok(events)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn watched_movies(&self, user_id: i64) -> AppResult<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT movie_id::BIGINT
            FROM watched_movies
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn top_rated(
        &self,
        exclude: &HashSet<i64>,
        limit: usize,
    ) -> AppResult<Vec<PopularMovie>> {
        let excluded: Vec<i64> = exclude.iter().copied().collect();

        let rows: Vec<PopularRow> = sqlx::query_as(
            r#"
            SELECT m.movie_id::BIGINT AS movie_id,
                   COALESCE(AVG(r.rating), 0)::DOUBLE PRECISION AS avg_rating,
                   COALESCE(m.imdb_rating, 0)::DOUBLE PRECISION AS imdb_rating
            FROM movies m
            LEFT JOIN ratings r ON r.movie_id = m.movie_id
            WHERE m.movie_id::BIGINT <> ALL($1)
            GROUP BY m.movie_id, m.imdb_rating
            ORDER BY avg_rating DESC, imdb_rating DESC, m.movie_id ASC
            LIMIT $2
            "#,
        )
        .bind(&excluded)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PopularMovie {
                movie_id: row.movie_id,
                avg_rating: row.avg_rating,
                imdb_rating: row.imdb_rating,
            })
            .collect())
    }
}

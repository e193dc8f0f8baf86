//! C1: durable per-`(content_id, user_id)` rating store (spec §3, §4.5).
//!
//! Methods are synchronous so both the async ingest handlers (C5) and the
//! plain-thread aggregation worker (C6) can share one trait object. The
//! Postgres implementation bridges to `sqlx`'s async API the same way
//! `read_model::postgres::PostgresInventoryStore` does: by borrowing the
//! ambient Tokio runtime with `Handle::block_on`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ratings_content::{ContentId, RatingError, RatingRow, RatingValue};
use ratings_core::UserId;
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatingStoreError {
    #[error("no tokio runtime available to bridge the async store call")]
    NoRuntime,

    #[error("database error: {0}")]
    Database(String),

    #[error("stored rating value out of range: {0}")]
    Corrupt(#[from] RatingError),
}

/// C1 — Rating Store.
pub trait RatingStore: Send + Sync {
    /// Count of rows for `content_id` with `rating = rating_value` created
    /// since `since` (used by the admission-weight calculation in §4.5 and
    /// the anomaly predicate in §4.6 step 3).
    fn count_recent_same_value(
        &self,
        content_id: ContentId,
        rating_value: i32,
        since: DateTime<Utc>,
    ) -> Result<i64, RatingStoreError>;

    /// Count of all rows for `content_id` created since `since` (the
    /// anomaly predicate's `total_recent`, §4.6 step 3).
    fn count_recent_total(&self, content_id: ContentId, since: DateTime<Utc>) -> Result<i64, RatingStoreError>;

    fn get(&self, content_id: ContentId, user_id: UserId) -> Result<Option<RatingRow>, RatingStoreError>;

    /// Insert-or-update the `(content_id, user_id)` row (I5); always resets
    /// `processed` to `false` (I6).
    fn upsert(
        &self,
        content_id: ContentId,
        user_id: UserId,
        rating: RatingValue,
        weight: f64,
        now: DateTime<Utc>,
    ) -> Result<RatingRow, RatingStoreError>;

    fn list_for_content(&self, content_id: ContentId) -> Result<Vec<RatingRow>, RatingStoreError>;

    fn list_unprocessed_for_content(&self, content_id: ContentId) -> Result<Vec<RatingRow>, RatingStoreError>;

    /// Overwrite a row's weight without touching `processed` (the anomaly
    /// override in §4.6 step 3).
    fn set_weight(&self, id: i64, weight: f64) -> Result<(), RatingStoreError>;

    fn mark_processed(&self, ids: &[i64]) -> Result<(), RatingStoreError>;
}

pub struct PostgresRatingStore {
    pool: Arc<PgPool>,
}

impl PostgresRatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn runtime() -> Result<tokio::runtime::Handle, RatingStoreError> {
        tokio::runtime::Handle::try_current().map_err(|_| RatingStoreError::NoRuntime)
    }

    fn row_to_rating(row: &sqlx::postgres::PgRow) -> Result<RatingRow, RatingStoreError> {
        let rating_value: i32 = row.try_get("rating").map_err(|e| RatingStoreError::Database(e.to_string()))?;
        Ok(RatingRow {
            id: row.try_get("id").map_err(|e| RatingStoreError::Database(e.to_string()))?,
            content_id: ContentId(row.try_get("content_id").map_err(|e| RatingStoreError::Database(e.to_string()))?),
            user_id: UserId::from_uuid(row.try_get("user_id").map_err(|e| RatingStoreError::Database(e.to_string()))?),
            rating: RatingValue::new(rating_value)?,
            weight: row.try_get("weight").map_err(|e| RatingStoreError::Database(e.to_string()))?,
            created_at: row.try_get("created_at").map_err(|e| RatingStoreError::Database(e.to_string()))?,
            updated_at: row.try_get("updated_at").map_err(|e| RatingStoreError::Database(e.to_string()))?,
            processed: row.try_get("processed").map_err(|e| RatingStoreError::Database(e.to_string()))?,
        })
    }
}

impl RatingStore for PostgresRatingStore {
    fn count_recent_same_value(
        &self,
        content_id: ContentId,
        rating_value: i32,
        since: DateTime<Utc>,
    ) -> Result<i64, RatingStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            sqlx::query(
                r#"
                SELECT COUNT(*) AS n
                FROM rating
                WHERE content_id = $1 AND rating = $2 AND created_at >= $3
                "#,
            )
            .bind(content_id.0)
            .bind(rating_value)
            .bind(since)
            .fetch_one(&*pool)
            .await
            .map_err(|e| RatingStoreError::Database(e.to_string()))
            .and_then(|row| row.try_get::<i64, _>("n").map_err(|e| RatingStoreError::Database(e.to_string())))
        })
    }

    fn count_recent_total(&self, content_id: ContentId, since: DateTime<Utc>) -> Result<i64, RatingStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            sqlx::query(
                r#"
                SELECT COUNT(*) AS n
                FROM rating
                WHERE content_id = $1 AND created_at >= $2
                "#,
            )
            .bind(content_id.0)
            .bind(since)
            .fetch_one(&*pool)
            .await
            .map_err(|e| RatingStoreError::Database(e.to_string()))
            .and_then(|row| row.try_get::<i64, _>("n").map_err(|e| RatingStoreError::Database(e.to_string())))
        })
    }

    fn get(&self, content_id: ContentId, user_id: UserId) -> Result<Option<RatingRow>, RatingStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();
        let user_uuid = *user_id.as_uuid();

        let row = handle.block_on(async move {
            sqlx::query(
                r#"
                SELECT id, content_id, user_id, rating, weight, created_at, updated_at, processed
                FROM rating
                WHERE content_id = $1 AND user_id = $2
                "#,
            )
            .bind(content_id.0)
            .bind(user_uuid)
            .fetch_optional(&*pool)
            .await
            .map_err(|e| RatingStoreError::Database(e.to_string()))
        })?;

        row.as_ref().map(Self::row_to_rating).transpose()
    }

    fn upsert(
        &self,
        content_id: ContentId,
        user_id: UserId,
        rating: RatingValue,
        weight: f64,
        now: DateTime<Utc>,
    ) -> Result<RatingRow, RatingStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();
        let user_uuid = *user_id.as_uuid();
        let rating_value = rating.get();

        let row = handle.block_on(async move {
            sqlx::query(
                r#"
                INSERT INTO rating (content_id, user_id, rating, weight, created_at, updated_at, processed)
                VALUES ($1, $2, $3, $4, $5, $5, FALSE)
                ON CONFLICT (content_id, user_id)
                DO UPDATE SET
                    rating = EXCLUDED.rating,
                    weight = EXCLUDED.weight,
                    updated_at = EXCLUDED.updated_at,
                    processed = FALSE
                RETURNING id, content_id, user_id, rating, weight, created_at, updated_at, processed
                "#,
            )
            .bind(content_id.0)
            .bind(user_uuid)
            .bind(rating_value)
            .bind(weight)
            .bind(now)
            .fetch_one(&*pool)
            .await
            .map_err(|e| RatingStoreError::Database(e.to_string()))
        })?;

        Self::row_to_rating(&row)
    }

    fn list_for_content(&self, content_id: ContentId) -> Result<Vec<RatingRow>, RatingStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();

        let rows = handle.block_on(async move {
            sqlx::query(
                r#"
                SELECT id, content_id, user_id, rating, weight, created_at, updated_at, processed
                FROM rating
                WHERE content_id = $1
                "#,
            )
            .bind(content_id.0)
            .fetch_all(&*pool)
            .await
            .map_err(|e| RatingStoreError::Database(e.to_string()))
        })?;

        rows.iter().map(Self::row_to_rating).collect()
    }

    fn list_unprocessed_for_content(&self, content_id: ContentId) -> Result<Vec<RatingRow>, RatingStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();

        let rows = handle.block_on(async move {
            sqlx::query(
                r#"
                SELECT id, content_id, user_id, rating, weight, created_at, updated_at, processed
                FROM rating
                WHERE content_id = $1 AND processed = FALSE
                "#,
            )
            .bind(content_id.0)
            .fetch_all(&*pool)
            .await
            .map_err(|e| RatingStoreError::Database(e.to_string()))
        })?;

        rows.iter().map(Self::row_to_rating).collect()
    }

    fn set_weight(&self, id: i64, weight: f64) -> Result<(), RatingStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();

        handle.block_on(async move {
            sqlx::query("UPDATE rating SET weight = $1 WHERE id = $2")
                .bind(weight)
                .bind(id)
                .execute(&*pool)
                .await
                .map(|_| ())
                .map_err(|e| RatingStoreError::Database(e.to_string()))
        })
    }

    fn mark_processed(&self, ids: &[i64]) -> Result<(), RatingStoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let handle = Self::runtime()?;
        let pool = self.pool.clone();
        let ids = ids.to_vec();

        handle.block_on(async move {
            sqlx::query("UPDATE rating SET processed = TRUE WHERE id = ANY($1)")
                .bind(&ids)
                .execute(&*pool)
                .await
                .map(|_| ())
                .map_err(|e| RatingStoreError::Database(e.to_string()))
        })
    }
}

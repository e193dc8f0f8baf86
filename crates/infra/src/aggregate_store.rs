//! C2: denormalized per-content aggregate store (spec §3, §4.6 step 4, §4.7).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ratings_content::{Content, ContentId};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateStoreError {
    #[error("no tokio runtime available to bridge the async store call")]
    NoRuntime,

    #[error("database error: {0}")]
    Database(String),
}

/// Sort column for `GET /contents` (spec §4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    CreatedAt,
    RatingCount,
    RatingAverage,
}

impl SortBy {
    fn column(self) -> &'static str {
        match self {
            SortBy::CreatedAt => "created_at",
            SortBy::RatingCount => "rating_count",
            SortBy::RatingAverage => "average_rating",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// C2 — Aggregate Store.
pub trait AggregateStore: Send + Sync {
    fn get_content(&self, content_id: ContentId) -> Result<Option<Content>, AggregateStoreError>;

    /// Persist a full recompute of the denormalized aggregate fields (spec
    /// §4.6 step 4). Does not touch `title`/`text`/`created_at`.
    fn save_aggregate(&self, content: &Content) -> Result<(), AggregateStoreError>;

    /// Page through contents sorted by a denormalized column, index-backed
    /// (spec §4.7 "Listing endpoint ... Reads directly from C2's
    /// denormalized columns"). Returns the page and the total row count for
    /// the pagination envelope.
    fn list_contents(
        &self,
        sort_by: SortBy,
        order: Order,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Content>, i64), AggregateStoreError>;
}

pub struct PostgresAggregateStore {
    pool: Arc<PgPool>,
}

impl PostgresAggregateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn runtime() -> Result<tokio::runtime::Handle, AggregateStoreError> {
        tokio::runtime::Handle::try_current().map_err(|_| AggregateStoreError::NoRuntime)
    }

    fn row_to_content(row: &sqlx::postgres::PgRow) -> Result<Content, AggregateStoreError> {
        let distribution_json: serde_json::Value = row
            .try_get("rating_distribution")
            .map_err(|e| AggregateStoreError::Database(e.to_string()))?;
        let rating_distribution: BTreeMap<i32, i64> =
            serde_json::from_value(distribution_json).unwrap_or_default();

        Ok(Content {
            id: ContentId(row.try_get("id").map_err(|e| AggregateStoreError::Database(e.to_string()))?),
            title: row.try_get("title").map_err(|e| AggregateStoreError::Database(e.to_string()))?,
            text: row.try_get("text").map_err(|e| AggregateStoreError::Database(e.to_string()))?,
            created_at: row
                .try_get::<DateTime<Utc>, _>("created_at")
                .map_err(|e| AggregateStoreError::Database(e.to_string()))?,
            rating_count: row.try_get("rating_count").map_err(|e| AggregateStoreError::Database(e.to_string()))?,
            average_rating: row
                .try_get("average_rating")
                .map_err(|e| AggregateStoreError::Database(e.to_string()))?,
            rating_distribution,
        })
    }
}

impl AggregateStore for PostgresAggregateStore {
    fn get_content(&self, content_id: ContentId) -> Result<Option<Content>, AggregateStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();

        let row = handle.block_on(async move {
            sqlx::query(
                r#"
                SELECT id, title, text, created_at, rating_count, average_rating, rating_distribution
                FROM content
                WHERE id = $1
                "#,
            )
            .bind(content_id.0)
            .fetch_optional(&*pool)
            .await
            .map_err(|e| AggregateStoreError::Database(e.to_string()))
        })?;

        row.as_ref().map(Self::row_to_content).transpose()
    }

    fn save_aggregate(&self, content: &Content) -> Result<(), AggregateStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();
        let id = content.id.0;
        let rating_count = content.rating_count;
        let average_rating = content.average_rating;
        let distribution_json = serde_json::to_value(&content.rating_distribution).unwrap_or_default();

        handle.block_on(async move {
            sqlx::query(
                r#"
                UPDATE content
                SET rating_count = $2, average_rating = $3, rating_distribution = $4
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(rating_count)
            .bind(average_rating)
            .bind(distribution_json)
            .execute(&*pool)
            .await
            .map(|_| ())
            .map_err(|e| AggregateStoreError::Database(e.to_string()))
        })
    }

    fn list_contents(
        &self,
        sort_by: SortBy,
        order: Order,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Content>, i64), AggregateStoreError> {
        let handle = Self::runtime()?;
        let pool = self.pool.clone();
        let offset = (page.saturating_sub(1)) as i64 * page_size as i64;
        let limit = page_size as i64;

        // `sort_by`/`order` are enums mapped to a fixed column/direction set
        // above, never interpolated from raw user input, so this is not
        // susceptible to SQL injection despite the format! below.
        let query = format!(
            r#"
            SELECT id, title, text, created_at, rating_count, average_rating, rating_distribution
            FROM content
            ORDER BY {} {}
            LIMIT $1 OFFSET $2
            "#,
            sort_by.column(),
            order.sql()
        );

        let (rows, total) = handle.block_on(async move {
            let rows = sqlx::query(&query)
                .bind(limit)
                .bind(offset)
                .fetch_all(&*pool)
                .await
                .map_err(|e| AggregateStoreError::Database(e.to_string()))?;

            let total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM content")
                .fetch_one(&*pool)
                .await
                .map_err(|e| AggregateStoreError::Database(e.to_string()))?
                .try_get("n")
                .map_err(|e| AggregateStoreError::Database(e.to_string()))?;

            Ok::<_, AggregateStoreError>((rows, total))
        })?;

        let contents = rows.iter().map(Self::row_to_content).collect::<Result<Vec<_>, _>>()?;
        Ok((contents, total))
    }
}

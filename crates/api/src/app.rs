//! Router wiring and handlers for C5 (Ingest Service) and C7 (Query
//! Service). Grounded on the teacher's `app.rs`: `Extension`-injected
//! services, a `json_error` helper, and a `*_error_to_response`-style
//! mapping from domain errors to status codes.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;

use ratings_content::{AdmissionPolicy, ContentId, RatingError, RatingEvent, RatingValue};
use ratings_core::UserId;
use ratings_events::EventBus;
use ratings_infra::{
    AggregateStore, AggregateStoreError, Config, MokaStatsCache, Order, PostgresAggregateStore,
    PostgresRatingStore, RatingEventBus, RatingStore, RatingStoreError, RedisStatsCache, SortBy, StatsCache,
    StatsEntry, DEFAULT_TTL,
};

#[derive(Clone)]
struct AppServices {
    rating_store: Arc<dyn RatingStore>,
    aggregate_store: Arc<dyn AggregateStore>,
    stats_cache: Arc<dyn StatsCache>,
    event_bus: Arc<RatingEventBus>,
    admission_policy: AdmissionPolicy,
}

async fn build_services(config: &Config) -> AppServices {
    let pool = sqlx::PgPool::connect(&config.database_url)
        .await
        .expect("failed to connect to Postgres");

    let rating_store: Arc<dyn RatingStore> = Arc::new(PostgresRatingStore::new(pool.clone()));
    let aggregate_store: Arc<dyn AggregateStore> = Arc::new(PostgresAggregateStore::new(pool));

    // Redis is the shared cache so multiple Query Service instances see the
    // same invalidations; fall back to an in-process cache if Redis can't be
    // reached (single-instance dev/test posture, per stats_cache.rs docs).
    let stats_cache: Arc<dyn StatsCache> = match RedisStatsCache::new(&config.redis_url) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::warn!(error = %e, "could not reach redis for the stats cache, falling back to an in-process cache");
            Arc::new(MokaStatsCache::default())
        }
    };

    let event_bus = Arc::new(
        RatingEventBus::new(&config.redis_url, None).expect("failed to construct the ratings event bus"),
    );

    AppServices {
        rating_store,
        aggregate_store,
        stats_cache,
        event_bus,
        admission_policy: config.admission_policy,
    }
}

pub async fn build_app(config: Config) -> Router {
    let jwt = Arc::new(ratings_auth::Hs256JwtValidator::new(config.jwt_secret.clone().into_bytes()));
    let auth_state = crate::middleware::AuthState { jwt };

    let services = Arc::new(build_services(&config).await);

    let protected = Router::new()
        .route("/contents", get(list_contents))
        .route("/contents/:id", get(get_content))
        .route("/contents/rate", post(submit_rating))
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            crate::middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Run a store-bound closure on the blocking thread pool.
///
/// `RatingStore`/`AggregateStore` are sync traits whose Postgres
/// implementations bridge to `sqlx` with `Handle::current().block_on(..)`
/// (see `ratings-infra`'s store docs) — calling that directly from a
/// handler body would run on an async runtime worker thread and panic with
/// "Cannot start a runtime from within a runtime." `spawn_blocking` moves
/// the call onto a dedicated blocking-pool thread, the same way the
/// teacher's worker loops are wrapped (`app.rs` "AppServices"-holds-an-
/// `Arc` bootstrap, projection workers spawned via `spawn_blocking`).
async fn blocking<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking store task panicked")
}

/// Item shape shared by the listing and detail endpoints (spec §4.7
/// "Returns `{id, title, user_rating, average_rating, rating_count,
/// created_at}`").
#[derive(Debug, Serialize)]
struct ContentItem {
    id: i64,
    title: String,
    user_rating: Option<i32>,
    average_rating: f64,
    rating_count: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Page {
    count: i64,
    next: Option<u32>,
    previous: Option<u32>,
    results: Vec<ContentItem>,
}

const PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
struct ListQuery {
    sort_by: Option<String>,
    order: Option<String>,
    page: Option<u32>,
}

fn parse_sort_by(raw: Option<&str>) -> Result<SortBy, QueryError> {
    match raw.unwrap_or("created_at") {
        "created_at" => Ok(SortBy::CreatedAt),
        "rating_count" => Ok(SortBy::RatingCount),
        "rating_average" => Ok(SortBy::RatingAverage),
        other => Err(QueryError::Validation(format!("unknown sort_by: {other}"))),
    }
}

fn parse_order(raw: Option<&str>) -> Result<Order, QueryError> {
    match raw.unwrap_or("desc") {
        "asc" => Ok(Order::Asc),
        "desc" => Ok(Order::Desc),
        other => Err(QueryError::Validation(format!("unknown order: {other}"))),
    }
}

async fn list_contents(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<crate::context::UserContext>,
    Query(params): Query<ListQuery>,
) -> axum::response::Response {
    match blocking(move || list_contents_inner(&services, &user, &params)).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => query_error_to_response(e),
    }
}

fn list_contents_inner(
    services: &AppServices,
    user: &crate::context::UserContext,
    params: &ListQuery,
) -> Result<Page, QueryError> {
    let sort_by = parse_sort_by(params.sort_by.as_deref())?;
    let order = parse_order(params.order.as_deref())?;
    let page = params.page.unwrap_or(1).max(1);

    let (contents, count) = services.aggregate_store.list_contents(sort_by, order, page, PAGE_SIZE)?;

    let results = contents
        .into_iter()
        .map(|c| to_content_item(services, user.user_id(), c))
        .collect::<Result<Vec<_>, _>>()?;

    let has_next = (page as i64) * (PAGE_SIZE as i64) < count;
    Ok(Page {
        count,
        next: has_next.then_some(page + 1),
        previous: (page > 1).then_some(page - 1),
        results,
    })
}

async fn get_content(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<crate::context::UserContext>,
    Path(id): Path<i64>,
) -> axum::response::Response {
    match blocking(move || get_content_inner(&services, &user, id)).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => query_error_to_response(e),
    }
}

fn get_content_inner(
    services: &AppServices,
    user: &crate::context::UserContext,
    id: i64,
) -> Result<ContentItem, QueryError> {
    let content_id = ContentId(id);
    let mut content = services
        .aggregate_store
        .get_content(content_id)?
        .ok_or(QueryError::NotFound)?;

    // C2 is authoritative; C3 is consulted for this point lookup's stat
    // fields and kept warm for the next read (spec §4.7 "uses C3 for
    // single-content stat lookups"). The worker invalidates C3 on every
    // recompute (spec §4.6 step 6), so a hit here is never older than the
    // last event processed for this content.
    match services.stats_cache.get(content_id) {
        Some(cached) => {
            content.average_rating = cached.average_rating;
            content.rating_count = cached.rating_count;
        }
        None => {
            services.stats_cache.set(
                content_id,
                StatsEntry {
                    average_rating: content.average_rating,
                    rating_count: content.rating_count,
                },
                DEFAULT_TTL,
            );
        }
    }

    to_content_item(services, user.user_id(), content)
}

fn to_content_item(
    services: &AppServices,
    user_id: UserId,
    content: ratings_content::Content,
) -> Result<ContentItem, QueryError> {
    let user_rating = services
        .rating_store
        .get(content.id, user_id)?
        .map(|row| row.rating.get());

    Ok(ContentItem {
        id: content.id.0,
        title: content.title,
        user_rating,
        average_rating: content.average_rating,
        rating_count: content.rating_count,
        created_at: content.created_at,
    })
}

#[derive(Debug, Deserialize)]
struct SubmitRatingRequest {
    content_id: Option<i64>,
    rating: Option<i32>,
}

#[derive(Debug, Serialize)]
struct SubmitRatingResponse {
    status: &'static str,
    rating: i32,
    weight: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    deferred_aggregation: bool,
}

async fn submit_rating(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<crate::context::UserContext>,
    Json(body): Json<SubmitRatingRequest>,
) -> axum::response::Response {
    match blocking(move || submit_rating_inner(&services, &user, body)).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => ingest_error_to_response(e),
    }
}

fn submit_rating_inner(
    services: &AppServices,
    user: &crate::context::UserContext,
    body: SubmitRatingRequest,
) -> Result<SubmitRatingResponse, IngestError> {
    let content_id = ContentId(body.content_id.ok_or_else(|| IngestError::Validation("missing content_id".into()))?);
    let raw_rating = body.rating.ok_or_else(|| IngestError::Validation("missing rating".into()))?;
    let rating = RatingValue::new(raw_rating)?;

    if services.aggregate_store.get_content(content_id)?.is_none() {
        return Err(IngestError::NotFound);
    }

    let now = Utc::now();
    let since = now - ChronoDuration::minutes(60);
    let n = services
        .rating_store
        .count_recent_same_value(content_id, rating.get(), since)?;
    let weight = services.admission_policy.admission_weight(n);

    ratings_observability::metrics::record_admission_weight(weight);

    let row = services.rating_store.upsert(content_id, user.user_id(), rating, weight, now)?;

    let event = RatingEvent {
        content_id,
        rating_id: row.id,
        user_id: user.user_id(),
        rating_value: rating.get(),
        submitted_at: now,
    };

    // Spec §4.5 "Publish failure after commit is logged and surfaced as a
    // non-fatal warning": the row is already durable, so a lost event only
    // delays aggregation, it never causes divergence.
    let deferred_aggregation = match services.event_bus.publish(event) {
        Ok(()) => false,
        Err(e) => {
            tracing::warn!(content_id = %content_id, error = %e, "failed to publish rating event after commit");
            true
        }
    };

    ratings_observability::metrics::record_rating_submitted(if deferred_aggregation { "deferred" } else { "ok" });

    Ok(SubmitRatingResponse {
        status: "ok",
        rating: rating.get(),
        weight,
        deferred_aggregation,
    })
}

#[derive(Debug)]
enum QueryError {
    Validation(String),
    NotFound,
    Store(String),
}

impl From<AggregateStoreError> for QueryError {
    fn from(e: AggregateStoreError) -> Self {
        QueryError::Store(e.to_string())
    }
}

impl From<RatingStoreError> for QueryError {
    fn from(e: RatingStoreError) -> Self {
        QueryError::Store(e.to_string())
    }
}

fn query_error_to_response(err: QueryError) -> axum::response::Response {
    match err {
        QueryError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        QueryError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "content not found"),
        QueryError::Store(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg),
    }
}

#[derive(Debug)]
enum IngestError {
    Validation(String),
    NotFound,
    Store(String),
}

impl From<RatingError> for IngestError {
    fn from(e: RatingError) -> Self {
        IngestError::Validation(e.to_string())
    }
}

impl From<AggregateStoreError> for IngestError {
    fn from(e: AggregateStoreError) -> Self {
        IngestError::Store(e.to_string())
    }
}

impl From<RatingStoreError> for IngestError {
    fn from(e: RatingStoreError) -> Self {
        IngestError::Store(e.to_string())
    }
}

fn ingest_error_to_response(err: IngestError) -> axum::response::Response {
    match err {
        IngestError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        IngestError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "content not found"),
        IngestError::Store(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg),
    }
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

//! The `rating-processor` CLI entry point (spec §6 "CLI surface"): a single
//! long-running process that starts C6 and runs it until shutdown. The HTTP
//! service (`ratings-api`) is a separate entry point.
//!
//! Grounded on `contents/management/commands/run_rating_processor.py` (a
//! thin command wrapping `RatingProcessor().run()`) combined with
//! `ratings-api`'s `main.rs` bootstrap idiom.

use std::sync::Arc;

use ratings_infra::{
    AggregationWorker, AggregationWorkerConfig, Config, MokaStatsCache, PostgresAggregateStore,
    PostgresRatingStore, RatingEventBus, RatingStreamConsumer, RedisStatsCache, StatsCache,
};

#[tokio::main]
async fn main() {
    ratings_observability::init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid configuration, exiting");
        std::process::exit(1);
    });

    if let Some(kafka) = &config.kafka_bootstrap_servers {
        tracing::warn!(
            kafka_bootstrap_servers = %kafka,
            "KAFKA_BOOTSTRAP_SERVERS is recognized but unused; this deployment consumes the ratings stream over REDIS_URL"
        );
    }

    let pool = sqlx::PgPool::connect(&config.database_url)
        .await
        .expect("failed to connect to Postgres");

    let rating_store = Arc::new(PostgresRatingStore::new(pool.clone()));
    let aggregate_store = Arc::new(PostgresAggregateStore::new(pool));

    let stats_cache: Arc<dyn StatsCache> = match RedisStatsCache::new(&config.redis_url) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::warn!(error = %e, "could not reach redis for the stats cache, falling back to an in-process cache");
            Arc::new(MokaStatsCache::default())
        }
    };

    let bus = Arc::new(
        RatingEventBus::new(&config.redis_url, None).expect("failed to construct the ratings event bus"),
    );
    let consumer = RatingStreamConsumer::new(
        bus,
        "rating_processor_group",
        format!("rating-processor-{}", std::process::id()),
    );

    let handle = AggregationWorker::spawn(
        "aggregation-worker",
        AggregationWorkerConfig::default(),
        consumer,
        rating_store,
        aggregate_store,
        stats_cache,
        config.anomaly_policy,
    )
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "could not start the aggregation worker, exiting");
        std::process::exit(1);
    });

    tracing::info!("rating-processor started");

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutdown signal received, stopping aggregation worker");
    handle.shutdown();
}

//! Infrastructure layer: stores, cache, event bus, the aggregation worker, and config.

pub mod aggregate_store;
pub mod config;
pub mod event_bus;
pub mod rating_store;
pub mod stats_cache;
pub mod worker;

pub use aggregate_store::{AggregateStore, AggregateStoreError, Order, PostgresAggregateStore, SortBy};
pub use config::{Config, ConfigError};
pub use event_bus::{EventBusError, RatingEventBus, RatingStreamConsumer, StreamEntry};
pub use rating_store::{PostgresRatingStore, RatingStore, RatingStoreError};
pub use stats_cache::{MokaStatsCache, RedisStatsCache, StatsCache, StatsEntry, DEFAULT_TTL};
pub use worker::{AggregationWorker, AggregationWorkerConfig, AggregationWorkerHandle, WorkerStartupError};

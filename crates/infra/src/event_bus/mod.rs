//! C4: the `ratings` event stream (spec §3 RatingEvent, §6).
//!
//! Transport is Redis Streams rather than Kafka (see the grounding ledger
//! for why): XADD for publish, a consumer group for `rating_processor_group`,
//! and manual XACK after the aggregation worker's batch procedure succeeds.

pub mod redis_streams;

pub use redis_streams::{EventBusError, RatingEventBus, RatingStreamConsumer, StreamEntry};

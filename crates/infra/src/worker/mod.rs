//! C6: the aggregation worker.

pub mod aggregation_worker;

pub use aggregation_worker::{AggregationWorker, AggregationWorkerConfig, AggregationWorkerHandle, WorkerStartupError};

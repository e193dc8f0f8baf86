//! C6: stream consumer that re-scores recent ratings for anomalies,
//! recomputes per-content aggregates, and invalidates the stats cache
//! (spec §4.6).
//!
//! Modeled on `infra::workers::projection_worker` (subscribe + idempotent
//! handler + graceful shutdown) fused with
//! `infra::ai::inventory_anomaly_runner` (plain-OS-thread loop, bounded
//! startup retry, a failure counter). Unlike the teacher's projection
//! worker, this one drives `RatingStreamConsumer` directly rather than a
//! fire-and-forget subscribe channel, so it can withhold the XACK on store
//! failure (spec §4.6 "Failure semantics and retries").

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use ratings_content::AnomalyPolicy;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregate_store::AggregateStore;
use crate::event_bus::{EventBusError, RatingStreamConsumer};
use crate::rating_store::RatingStore;
use crate::stats_cache::StatsCache;

#[derive(Debug, Clone)]
pub struct AggregationWorkerConfig {
    /// Fixed delay between startup consumer-group attempts (spec §4.6
    /// "fixed delay (default 5s) up to 5 attempts on startup").
    pub startup_retry_delay: Duration,
    pub startup_max_retries: u32,
    /// Delay before reconnecting after the broker is lost mid-session (spec
    /// §4.6 "sleep 5s and reconnect indefinitely").
    pub reconnect_delay: Duration,
}

impl Default for AggregationWorkerConfig {
    fn default() -> Self {
        Self {
            startup_retry_delay: Duration::from_secs(5),
            startup_max_retries: 5,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerStartupError {
    #[error("could not reach the event stream after {0} attempts")]
    StreamUnreachable(u32),
}

#[derive(Debug)]
pub struct AggregationWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl AggregationWorkerHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

pub struct AggregationWorker;

impl AggregationWorker {
    /// Start the worker thread. Blocks (retrying per `config`) until the
    /// consumer group exists; returns an error if the broker is
    /// unreachable after exhausting startup retries (spec §7 "Fatal:
    /// misconfiguration at startup").
    pub fn spawn(
        name: &'static str,
        config: AggregationWorkerConfig,
        consumer: RatingStreamConsumer,
        rating_store: Arc<dyn RatingStore>,
        aggregate_store: Arc<dyn AggregateStore>,
        stats_cache: Arc<dyn StatsCache>,
        anomaly_policy: AnomalyPolicy,
    ) -> Result<AggregationWorkerHandle, WorkerStartupError> {
        let mut attempt = 0;
        loop {
            match consumer.ensure_group() {
                Ok(()) => break,
                Err(e) => {
                    attempt += 1;
                    warn!(worker = name, attempt, error = %e, "failed to reach event stream at startup");
                    if attempt >= config.startup_max_retries {
                        return Err(WorkerStartupError::StreamUnreachable(attempt));
                    }
                    thread::sleep(config.startup_retry_delay);
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        // The stores bridge to `sqlx` with `Handle::try_current().block_on(..)`
        // (see rating_store.rs docs); that requires a runtime context on
        // *this* thread, which a plain `thread::spawn` doesn't have by
        // default, so we capture the caller's handle and enter it here.
        let runtime_handle = tokio::runtime::Handle::current();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = runtime_handle.enter();
                worker_loop(
                    name,
                    config,
                    consumer,
                    shutdown_rx,
                    rating_store,
                    aggregate_store,
                    stats_cache,
                    anomaly_policy,
                )
            })
            .expect("failed to spawn aggregation worker thread");

        Ok(AggregationWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop(
    name: &'static str,
    config: AggregationWorkerConfig,
    consumer: RatingStreamConsumer,
    shutdown_rx: mpsc::Receiver<()>,
    rating_store: Arc<dyn RatingStore>,
    aggregate_store: Arc<dyn AggregateStore>,
    stats_cache: Arc<dyn StatsCache>,
    anomaly_policy: AnomalyPolicy,
) {
    info!(worker = name, "aggregation worker started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match consumer.poll() {
            Ok(entries) => {
                for entry in entries {
                    let Some(event) = entry.event else {
                        warn!(worker = name, message_id = %entry.message_id, "skipping poison event");
                        let _ = consumer.ack(&[entry.message_id]);
                        continue;
                    };

                    match process_content(
                        event.content_id,
                        &*rating_store,
                        &*aggregate_store,
                        &*stats_cache,
                        &anomaly_policy,
                    ) {
                        Ok(()) => {
                            ratings_observability::metrics::record_batch_processed("ok");
                            let _ = consumer.ack(&[entry.message_id]);
                        }
                        Err(e) => {
                            ratings_observability::metrics::record_batch_processed("error");
                            warn!(
                                worker = name,
                                content_id = %event.content_id,
                                error = %e,
                                "batch recompute failed, leaving event unacked for redelivery"
                            );
                        }
                    }
                }
            }
            Err(EventBusError::Connection(msg)) => {
                warn!(worker = name, error = %msg, "lost connection to event stream, reconnecting");
                thread::sleep(config.reconnect_delay);
            }
            Err(e) => {
                warn!(worker = name, error = %e, "failed to read from event stream");
                thread::sleep(config.reconnect_delay);
            }
        }
    }

    info!(worker = name, "aggregation worker stopped");
}

#[derive(Debug, Error)]
enum BatchError {
    #[error(transparent)]
    RatingStore(#[from] crate::rating_store::RatingStoreError),
    #[error(transparent)]
    AggregateStore(#[from] crate::aggregate_store::AggregateStoreError),
}

/// The per-event batch procedure (spec §4.6 steps 1-6). Idempotent: a
/// redelivered event finds no unprocessed rows and recomputes the same
/// aggregate from a full read of all rows.
fn process_content(
    content_id: ratings_content::ContentId,
    rating_store: &dyn RatingStore,
    aggregate_store: &dyn AggregateStore,
    stats_cache: &dyn StatsCache,
    anomaly_policy: &AnomalyPolicy,
) -> Result<(), BatchError> {
    // Step 1: load Content; missing content is poison-pill tolerance, not
    // an error to retry.
    let Some(mut content) = aggregate_store.get_content(content_id)? else {
        warn!(content_id = %content_id, "content not found, skipping aggregation");
        return Ok(());
    };

    // Step 2: unprocessed rows.
    let unprocessed = rating_store.list_unprocessed_for_content(content_id)?;

    // Step 3: anomaly re-scoring over the trailing hour.
    let since = Utc::now() - chrono::Duration::hours(1);
    let mut processed_ids = Vec::with_capacity(unprocessed.len());
    for row in &unprocessed {
        let total_recent = rating_store.count_recent_total(content_id, since)?;
        let same_value_recent = rating_store.count_recent_same_value(content_id, row.rating.get(), since)?;

        if anomaly_policy.is_anomalous(total_recent, same_value_recent) {
            rating_store.set_weight(row.id, anomaly_policy.anomaly_weight_penalty)?;
            ratings_observability::metrics::record_anomaly_penalty_applied();
        }

        processed_ids.push(row.id);
    }

    // Step 4: full recompute over every row for this content (authoritative
    // reconciliation — makes redelivery and out-of-order anomaly scoring
    // converge to the same result).
    let all_rows = rating_store.list_for_content(content_id)?;
    let pairs: Vec<(i32, f64)> = all_rows.iter().map(|r| (r.rating.get(), r.weight)).collect();
    content.recompute_aggregate(&pairs);
    aggregate_store.save_aggregate(&content)?;

    // Step 5: mark the rows this event batch picked up as processed.
    rating_store.mark_processed(&processed_ids)?;

    // Step 6: invalidate the cache entry. The worker only invalidates; C7
    // repopulates it lazily on the next stale read (spec §4.7, §5).
    stats_cache.invalidate(content_id);

    Ok(())
}

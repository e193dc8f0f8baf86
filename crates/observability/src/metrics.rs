//! Thin counters/histograms facade over the `metrics` crate.
//!
//! Call sites record through these helpers rather than the `metrics` macros
//! directly, so the recorded metric names stay centralized and renaming one
//! doesn't require grepping every call site.

/// Record a rating submission (spec §4.5), tagged by outcome.
pub fn record_rating_submitted(outcome: &'static str) {
    metrics::counter!("ratings_submitted_total", "outcome" => outcome).increment(1);
}

/// Record the admission weight assigned to a submission (spec §4.5).
pub fn record_admission_weight(weight: f64) {
    metrics::histogram!("ratings_admission_weight").record(weight);
}

/// Record that the anomaly penalty fired for a row (spec §4.6 step 3).
pub fn record_anomaly_penalty_applied() {
    metrics::counter!("ratings_anomaly_penalty_applied_total").increment(1);
}

/// Record one aggregation-worker batch recompute, tagged by outcome.
pub fn record_batch_processed(outcome: &'static str) {
    metrics::counter!("ratings_batch_processed_total", "outcome" => outcome).increment(1);
}

//! Tracing, logging, metrics (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Logging configuration.
pub mod logging {}

/// Instrumentation counters/histograms.
///
/// Metrics exposition (a scrape endpoint) is out of scope (spec §1); this
/// module only records instrumentation so the counters exist once exposition
/// is wired up downstream — the same role `django_prometheus` played in the
/// source system (instrumented via middleware/`INSTALLED_APPS`, scraped by
/// an operator-managed Prometheus, never by code in this repo).
pub mod metrics;

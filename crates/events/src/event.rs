use chrono::{DateTime, Utc};

/// A domain-agnostic event trait for published facts.
///
/// Events represent things that already happened — they are immutable and
/// meant to be published once and consumed any number of times.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "rating.submitted").
    ///
    /// Convention: `{module}.{action}`.
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type. Starts at 1, only ever increases.
    fn version(&self) -> u32;

    /// When the event occurred (business time, not transport/persist time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

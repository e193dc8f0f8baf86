//! Event publishing abstraction (mechanics only).
//!
//! At-least-once delivery is acceptable; consumers must be idempotent.

use std::sync::Arc;

/// Domain-agnostic event publisher.
///
/// This is a lightweight publish contract. It makes no assumptions about
/// storage, transport, or threading model. Consumption is transport-specific
/// (see `ratings-infra::event_bus::RatingStreamConsumer`, which needs manual
/// ack control this trait doesn't attempt to generalize).
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }
}

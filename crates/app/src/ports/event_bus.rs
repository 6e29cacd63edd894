//! Event bus port: publish/subscribe for system log events.

use std::future::Future;

use irrigo_domain::error::IrrigoError;
use irrigo_domain::event::Event;

/// Publishes events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), IrrigoError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), IrrigoError>> + Send {
        (**self).publish(event)
    }
}

//! Event store port: persistence for the system log.

use std::future::Future;

use irrigo_domain::error::IrrigoError;
use irrigo_domain::event::Event;

/// Append-only log of [`Event`]s.
pub trait EventStore {
    /// Persist a new event.
    fn store(&self, event: Event) -> impl Future<Output = Result<Event, IrrigoError>> + Send;

    /// Get the most recent events, ordered newest-first.
    fn get_recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Event>, IrrigoError>> + Send;

    /// Drop every stored event.
    fn clear(&self) -> impl Future<Output = Result<(), IrrigoError>> + Send;
}

impl<T: EventStore + Send + Sync> EventStore for std::sync::Arc<T> {
    fn store(&self, event: Event) -> impl Future<Output = Result<Event, IrrigoError>> + Send {
        (**self).store(event)
    }

    fn get_recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Event>, IrrigoError>> + Send {
        (**self).get_recent(limit)
    }

    fn clear(&self) -> impl Future<Output = Result<(), IrrigoError>> + Send {
        (**self).clear()
    }
}

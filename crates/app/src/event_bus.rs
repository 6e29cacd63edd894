//! Fan-out of system log events inside the daemon.

use std::future::Future;

use tokio::sync::broadcast;

use irrigo_domain::error::IrrigoError;
use irrigo_domain::event::Event;

use crate::ports::EventPublisher;

/// Broadcasts every [`Event`] the engine emits to the recorder and any
/// other listener.
///
/// `capacity` bounds how far a slow listener may fall behind before it
/// starts losing the oldest entries.
pub struct InProcessEventBus {
    tx: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Listen for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, event: Event) -> impl Future<Output = Result<(), IrrigoError>> + Send {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            tracing::trace!(event_type = %event.event_type, "no listener, event dropped");
        }
        async { Ok(()) }
    }
}

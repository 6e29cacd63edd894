//! Event recorder: drains the event bus into the [`EventStore`].

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use irrigo_domain::event::Event;

use crate::ports::EventStore;

/// Spawn a task that persists every event received on `rx`.
///
/// The task ends when the bus is dropped. Lagging drops the oldest events
/// and keeps going; storage failures are logged and skipped.
pub fn spawn<S>(mut rx: broadcast::Receiver<Event>, store: S) -> JoinHandle<()>
where
    S: EventStore + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let event_type = event.event_type;
                    if let Err(err) = store.store(event).await {
                        tracing::error!(%event_type, error = %err, "failed to record event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event recorder lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

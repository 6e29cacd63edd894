//! Shared application state for axum handlers.

use std::sync::Arc;
use std::time::Instant;

use irrigo_app::engine::Engine;

/// Application state shared across all axum handlers.
///
/// Generic over the engine's port types and the event store to avoid
/// dynamic dispatch. `Clone` is implemented manually so the underlying
/// types themselves do not need to be `Clone`; only the `Arc`s are cloned.
pub struct AppState<D, PR, SR, SS, EP, ES> {
    /// The irrigation engine; every mutation goes through it.
    pub engine: Arc<Engine<D, PR, SR, SS, EP>>,
    /// Event store backing the system log.
    pub event_store: Arc<ES>,
    /// When the daemon started serving.
    pub started: Instant,
}

impl<D, PR, SR, SS, EP, ES> Clone for AppState<D, PR, SR, SS, EP, ES> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            event_store: Arc::clone(&self.event_store),
            started: self.started,
        }
    }
}

impl<D, PR, SR, SS, EP, ES> AppState<D, PR, SR, SS, EP, ES> {
    /// Create a new application state, taking ownership of both parts.
    pub fn new(engine: Engine<D, PR, SR, SS, EP>, event_store: ES) -> Self {
        Self {
            engine: Arc::new(engine),
            event_store: Arc::new(event_store),
            started: Instant::now(),
        }
    }

    /// Create a new application state from pre-wrapped `Arc`s.
    ///
    /// Use this when the engine is shared with the ticker before the HTTP
    /// state is built.
    pub fn from_arcs(engine: Arc<Engine<D, PR, SR, SS, EP>>, event_store: Arc<ES>) -> Self {
        Self {
            engine,
            event_store,
            started: Instant::now(),
        }
    }
}

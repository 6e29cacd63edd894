//! Axum router assembly.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use irrigo_app::ports::{
    EventPublisher, EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository,
    ZoneDriver,
};

use crate::state::AppState;

/// Build the top-level axum [`Router`].
///
/// The API lives at the root, where the control panel expects it.
/// Includes a [`TraceLayer`] that logs each HTTP request/response at the
/// `DEBUG` level using the `tracing` ecosystem.
pub fn build<D, PR, SR, SS, EP, ES>(state: AppState<D, PR, SR, SS, EP, ES>) -> Router
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_check))
        .merge(crate::api::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

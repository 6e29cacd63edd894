//! System log endpoints.

use axum::Json;
use axum::extract::State;

use irrigo_app::ports::{
    EventPublisher, EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository,
    ZoneDriver,
};
use irrigo_domain::event::Event;

use super::Ack;
use crate::error::ApiError;
use crate::state::AppState;

/// How many entries `GET /get_logs` returns.
pub const LOG_LIMIT: usize = 200;

/// `GET /get_logs`: most recent events, newest first.
pub async fn list<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Result<Json<Vec<Event>>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    Ok(Json(state.event_store.get_recent(LOG_LIMIT).await?))
}

/// `POST /clear_logs`
pub async fn clear<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    state.event_store.clear().await?;
    tracing::info!("system log cleared");
    Ok(Ack::ok())
}

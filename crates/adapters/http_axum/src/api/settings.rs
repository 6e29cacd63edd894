//! Settings endpoints: zone layout, safety limits and resets.

use axum::Json;
use axum::extract::State;

use irrigo_app::ports::{
    EventPublisher, EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository,
    ZoneDriver,
};
use irrigo_domain::settings::UserSettings;
use irrigo_domain::zone::Zone;

use super::Ack;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /get_zones`: configured zones, hidden ones included.
pub async fn zones<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Result<Json<Vec<Zone>>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    Ok(Json(state.engine.settings().await?.zones))
}

/// `GET /data/user_settings.json`
pub async fn get<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Result<Json<UserSettings>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    Ok(Json(state.engine.settings().await?))
}

/// `POST /save_user_settings`: stops anything running first.
pub async fn save<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(settings): Json<UserSettings>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    state.engine.save_settings(settings).await?;
    Ok(Ack::ok())
}

/// `POST /reset_settings`
pub async fn reset<D, PR, SR, SS, EP, ES>(
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
    state.engine.reset_settings().await?;
    Ok(Ack::ok())
}

/// `POST /reset_factory_data`: programs, settings and the system log.
pub async fn factory_reset<D, PR, SR, SS, EP, ES>(
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
    // cleared first, the reset event is recorded afterwards
    state.event_store.clear().await?;
    state.engine.reset_factory_data().await?;
    Ok(Ack::ok())
}

//! Execution endpoints: live state, zone status, start and stop.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use irrigo_app::ports::{
    EventPublisher, EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository,
    ZoneDriver,
};
use irrigo_domain::execution::{ExecutionState, Trigger, ZoneRun};
use irrigo_domain::id::{ProgramId, ZoneId};
use irrigo_domain::program::ProgramStep;

use super::{Ack, ProgramIdParam};
use crate::error::ApiError;
use crate::state::AppState;

/// Zone currently watered by a program.
#[derive(Debug, Serialize)]
pub struct ActiveZone {
    pub id: ZoneId,
    pub name: String,
    pub remaining_time: u32,
    pub total_time: u32,
}

impl From<&ZoneRun> for ActiveZone {
    fn from(run: &ZoneRun) -> Self {
        Self {
            id: run.zone_id,
            name: run.name.clone(),
            remaining_time: run.remaining_seconds,
            total_time: run.total_seconds,
        }
    }
}

/// Body of `GET /get_program_state`.
#[derive(Debug, Serialize)]
pub struct ProgramStateResponse {
    pub program_running: bool,
    pub current_program_id: Option<ProgramId>,
    pub current_program_name: Option<String>,
    pub trigger: Option<Trigger>,
    pub active_zone: Option<ActiveZone>,
    /// Seconds left in the pause between two steps.
    pub delay_remaining: Option<u32>,
    pub queue: Vec<ProgramStep>,
    pub fault: Option<String>,
}

impl From<&ExecutionState> for ProgramStateResponse {
    fn from(state: &ExecutionState) -> Self {
        Self {
            program_running: state.running(),
            current_program_id: state.current_program_id().cloned(),
            current_program_name: state.program.as_ref().map(|run| run.program_name.clone()),
            trigger: state.trigger(),
            active_zone: state.active_zone().map(ActiveZone::from),
            delay_remaining: state.delay_remaining(),
            queue: state.queue(),
            fault: state.fault.as_ref().map(|f| f.message.clone()),
        }
    }
}

/// One row of `GET /get_zones_status`.
#[derive(Debug, Serialize)]
pub struct ZoneStatusEntry {
    pub id: ZoneId,
    pub name: String,
    pub active: bool,
    /// Seconds.
    pub remaining_time: u32,
    /// Minutes the zone was started for.
    pub duration: u32,
}

#[derive(Debug, Deserialize)]
pub struct StartProgramRequest {
    pub program_id: ProgramIdParam,
}

#[derive(Debug, Deserialize)]
pub struct StartZoneRequest {
    pub zone_id: u32,
    /// Minutes.
    pub duration: u32,
}

#[derive(Debug, Deserialize)]
pub struct StopZoneRequest {
    pub zone_id: u32,
}

/// `GET /get_program_state`
pub async fn program_state<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Json<ProgramStateResponse>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    Json(ProgramStateResponse::from(&state.engine.state()))
}

/// `GET /get_zones_status`: every configured zone, on or off.
pub async fn zones_status<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Result<Json<Vec<ZoneStatusEntry>>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    let settings = state.engine.settings().await?;
    let execution = state.engine.state();
    let entries = settings
        .zones
        .iter()
        .map(|zone| {
            let run = execution.zone_run(zone.id);
            ZoneStatusEntry {
                id: zone.id,
                name: zone.name.clone(),
                active: run.is_some(),
                remaining_time: run.map_or(0, |r| r.remaining_seconds),
                duration: run.map_or(0, |r| r.total_seconds.div_ceil(60)),
            }
        })
        .collect();
    Ok(Json(entries))
}

/// `POST /start_program`: manual start.
pub async fn start_program<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<StartProgramRequest>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    let id = ProgramId::from(req.program_id);
    state.engine.start_program(&id, Trigger::Manual).await?;
    Ok(Ack::ok())
}

/// `POST /stop_program`: stops the program and any manual zone.
pub async fn stop_program<D, PR, SR, SS, EP, ES>(
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
    state.engine.stop_program().await?;
    Ok(Ack::ok())
}

/// `POST /start_zone`
pub async fn start_zone<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<StartZoneRequest>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    state
        .engine
        .start_zone(ZoneId(req.zone_id), req.duration)
        .await?;
    Ok(Ack::ok())
}

/// `POST /stop_zone`: succeeds when the zone was already off.
pub async fn stop_zone<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<StopZoneRequest>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    state.engine.stop_zone(ZoneId(req.zone_id)).await?;
    Ok(Ack::ok())
}

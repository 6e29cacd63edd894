//! Program endpoints: list, save, update, delete and the automatic switches.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use irrigo_app::ports::{
    EventPublisher, EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository,
    ZoneDriver,
};
use irrigo_domain::error::{IrrigoError, ValidationError};
use irrigo_domain::id::ProgramId;
use irrigo_domain::program::{Program, ProgramStep, Recurrence};

use super::{Ack, ProgramIdParam};
use crate::error::ApiError;
use crate::state::AppState;

/// Program as posted by the editor. `id` is absent for new programs.
#[derive(Debug, Deserialize)]
pub struct ProgramRequest {
    #[serde(default)]
    pub id: Option<ProgramIdParam>,
    pub name: String,
    pub activation_time: String,
    #[serde(default = "default_recurrence")]
    pub recurrence: Recurrence,
    pub months: Vec<u8>,
    pub steps: Vec<ProgramStep>,
    #[serde(default)]
    pub automatic_enabled: Option<bool>,
}

fn default_recurrence() -> Recurrence {
    Recurrence::Daily
}

impl ProgramRequest {
    fn into_program(self) -> Result<Program, IrrigoError> {
        let mut builder = Program::builder()
            .name(self.name)
            .activation_time(self.activation_time)
            .recurrence(self.recurrence)
            .months(self.months)
            .steps(self.steps);
        if let Some(id) = self.id {
            builder = builder.id(ProgramId::from(id));
        }
        if let Some(enabled) = self.automatic_enabled {
            builder = builder.automatic_enabled(enabled);
        }
        builder.build()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteProgramRequest {
    pub id: ProgramIdParam,
}

#[derive(Debug, Deserialize)]
pub struct ToggleProgramRequest {
    pub program_id: ProgramIdParam,
    pub enable: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToggleAllRequest {
    pub enable: bool,
}

/// `GET /data/program.json`: every program keyed by id.
pub async fn list<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Result<Json<BTreeMap<ProgramId, Program>>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    Ok(Json(state.engine.programs().await?))
}

/// `POST /save_program`: create, or replace when `id` is given.
pub async fn save<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<ProgramRequest>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    let program = req.into_program()?;
    let saved = state.engine.save_program(program).await?;
    Ok(Ack::saved(saved.id))
}

/// `POST /update_program`: the id must exist.
pub async fn update<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<ProgramRequest>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    if req.id.is_none() {
        return Err(IrrigoError::from(ValidationError::EmptyId).into());
    }
    let program = req.into_program()?;
    let saved = state.engine.update_program(program).await?;
    Ok(Ack::saved(saved.id))
}

/// `POST /delete_program`
pub async fn delete<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<DeleteProgramRequest>,
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
        .delete_program(&ProgramId::from(req.id))
        .await?;
    Ok(Ack::ok())
}

/// `POST /toggle_program_automatic`
pub async fn toggle_automatic<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<ToggleProgramRequest>,
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
        .set_program_automatic(&ProgramId::from(req.program_id), req.enable)
        .await?;
    Ok(Ack::ok())
}

/// `POST /toggle_automatic_programs`: global switch.
pub async fn toggle_all_automatic<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
    Json(req): Json<ToggleAllRequest>,
) -> Result<Json<Ack>, ApiError>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    state.engine.set_automatic_programs(req.enable).await?;
    Ok(Ack::ok())
}

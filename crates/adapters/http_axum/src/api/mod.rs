//! JSON API handler modules.
//!
//! Paths and payloads follow what the control panel polls and posts; every
//! mutation answers the `{"success": …}` envelope.

#[allow(clippy::missing_errors_doc)]
pub mod execution;
#[allow(clippy::missing_errors_doc)]
pub mod logs;
#[allow(clippy::missing_errors_doc)]
pub mod programs;
#[allow(clippy::missing_errors_doc)]
pub mod settings;
pub mod system;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use irrigo_app::ports::{
    EventPublisher, EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository,
    ZoneDriver,
};
use irrigo_domain::id::ProgramId;

use crate::state::AppState;

/// Successful mutation envelope.
#[derive(Debug, Serialize)]
pub struct Ack {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    program_id: Option<ProgramId>,
}

impl Ack {
    /// `{"success": true}`
    #[must_use]
    pub fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            program_id: None,
        })
    }

    /// `{"success": true, "program_id": …}`
    #[must_use]
    pub fn saved(program_id: ProgramId) -> Json<Self> {
        Json(Self {
            success: true,
            program_id: Some(program_id),
        })
    }
}

/// Program id as sent by clients, either `"3"` or `3`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProgramIdParam {
    Number(u64),
    Text(String),
}

impl From<ProgramIdParam> for ProgramId {
    fn from(value: ProgramIdParam) -> Self {
        match value {
            ProgramIdParam::Number(n) => Self::new(n.to_string()),
            ProgramIdParam::Text(s) => Self::new(s.trim()),
        }
    }
}

/// Build the API router.
pub fn routes<D, PR, SR, SS, EP, ES>() -> Router<AppState<D, PR, SR, SS, EP, ES>>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    Router::new()
        // Execution
        .route(
            "/get_program_state",
            get(execution::program_state::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/get_zones_status",
            get(execution::zones_status::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/start_program",
            post(execution::start_program::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/stop_program",
            post(execution::stop_program::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/start_zone",
            post(execution::start_zone::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/stop_zone",
            post(execution::stop_zone::<D, PR, SR, SS, EP, ES>),
        )
        // Programs
        .route(
            "/data/program.json",
            get(programs::list::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/save_program",
            post(programs::save::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/update_program",
            post(programs::update::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/delete_program",
            post(programs::delete::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/toggle_program_automatic",
            post(programs::toggle_automatic::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/toggle_automatic_programs",
            post(programs::toggle_all_automatic::<D, PR, SR, SS, EP, ES>),
        )
        // Settings
        .route("/get_zones", get(settings::zones::<D, PR, SR, SS, EP, ES>))
        .route(
            "/data/user_settings.json",
            get(settings::get::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/save_user_settings",
            post(settings::save::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/reset_settings",
            post(settings::reset::<D, PR, SR, SS, EP, ES>),
        )
        .route(
            "/reset_factory_data",
            post(settings::factory_reset::<D, PR, SR, SS, EP, ES>),
        )
        // Logs
        .route("/get_logs", get(logs::list::<D, PR, SR, SS, EP, ES>))
        .route("/clear_logs", post(logs::clear::<D, PR, SR, SS, EP, ES>))
        // System
        .route(
            "/get_server_stats",
            get(system::server_stats::<D, PR, SR, SS, EP, ES>),
        )
}

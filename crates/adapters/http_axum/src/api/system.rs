//! Daemon health figures for the control panel footer.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use irrigo_app::ports::{
    EventPublisher, EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository,
    ZoneDriver,
};

use crate::state::AppState;

/// Body of `GET /get_server_stats`.
#[derive(Debug, Serialize)]
pub struct ServerStats {
    /// Seconds since the daemon started serving.
    pub uptime: u64,
    pub uptime_human: String,
    pub active_zones: usize,
    pub program_running: bool,
}

fn human(uptime: u64) -> String {
    format!("{}h {}m", uptime / 3600, uptime % 3600 / 60)
}

/// `GET /get_server_stats`
pub async fn server_stats<D, PR, SR, SS, EP, ES>(
    State(state): State<AppState<D, PR, SR, SS, EP, ES>>,
) -> Json<ServerStats>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
    ES: EventStore + Send + Sync + 'static,
{
    let uptime = state.started.elapsed().as_secs();
    let execution = state.engine.state();
    Json(ServerStats {
        uptime,
        uptime_human: human(uptime),
        active_zones: execution.active_count(),
        program_running: execution.running(),
    })
}

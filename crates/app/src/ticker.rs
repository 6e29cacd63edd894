//! Ticker: drives [`Engine::tick`] from a tokio interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use irrigo_domain::time;

use crate::engine::Engine;
use crate::ports::{
    EventPublisher, ExecutionStateStore, ProgramRepository, SettingsRepository, ZoneDriver,
};

/// Spawn the periodic tick task. Abort the handle to stop it.
///
/// Missed ticks are skipped rather than bursted; the engine measures
/// elapsed time itself.
pub fn spawn<D, PR, SR, SS, EP>(
    engine: Arc<Engine<D, PR, SR, SS, EP>>,
    period: Duration,
) -> JoinHandle<()>
where
    D: ZoneDriver + Send + Sync + 'static,
    PR: ProgramRepository + Send + Sync + 'static,
    SR: SettingsRepository + Send + Sync + 'static,
    SS: ExecutionStateStore + Send + Sync + 'static,
    EP: EventPublisher + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(err) = engine.tick(time::now()).await {
                tracing::error!(error = %err, "tick failed");
            }
        }
    })
}

//! Storage ports: repository traits for persistence.

use std::future::Future;

use irrigo_domain::error::IrrigoError;
use irrigo_domain::execution::ExecutionState;
use irrigo_domain::id::ProgramId;
use irrigo_domain::program::Program;
use irrigo_domain::settings::UserSettings;

/// Repository for persisting and querying [`Program`]s.
pub trait ProgramRepository {
    /// Get a program by its identifier.
    fn get_by_id(
        &self,
        id: &ProgramId,
    ) -> impl Future<Output = Result<Option<Program>, IrrigoError>> + Send;

    /// Get all programs, in any order.
    fn get_all(&self) -> impl Future<Output = Result<Vec<Program>, IrrigoError>> + Send;

    /// Insert or replace a program by id.
    fn save(&self, program: Program) -> impl Future<Output = Result<Program, IrrigoError>> + Send;

    /// Delete a program. Returns `false` when nothing was stored under `id`.
    fn delete(&self, id: &ProgramId) -> impl Future<Output = Result<bool, IrrigoError>> + Send;

    /// Delete every program.
    fn delete_all(&self) -> impl Future<Output = Result<(), IrrigoError>> + Send;
}

/// Single-record store for [`UserSettings`].
pub trait SettingsRepository {
    /// Load the stored settings, `None` before the first save.
    fn load(&self) -> impl Future<Output = Result<Option<UserSettings>, IrrigoError>> + Send;

    /// Replace the stored settings.
    fn save(
        &self,
        settings: UserSettings,
    ) -> impl Future<Output = Result<UserSettings, IrrigoError>> + Send;
}

/// Single-record store for the engine's [`ExecutionState`], read back at startup.
pub trait ExecutionStateStore {
    fn load(&self) -> impl Future<Output = Result<Option<ExecutionState>, IrrigoError>> + Send;

    fn save(&self, state: ExecutionState) -> impl Future<Output = Result<(), IrrigoError>> + Send;
}

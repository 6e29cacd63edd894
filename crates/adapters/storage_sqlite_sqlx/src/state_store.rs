//! `SQLite` implementation of [`ExecutionStateStore`].

use sqlx::SqlitePool;

use irrigo_app::ports::ExecutionStateStore;
use irrigo_domain::error::IrrigoError;
use irrigo_domain::execution::ExecutionState;
use irrigo_domain::time::now;

use crate::error::StorageError;

const UPSERT: &str = r"
    INSERT INTO execution_state (id, data, updated_at) VALUES (1, ?, ?)
    ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
";

/// `SQLite`-backed snapshot of the running execution.
#[derive(Clone)]
pub struct SqliteExecutionStateStore {
    pool: SqlitePool,
}

impl SqliteExecutionStateStore {
    /// Create a new store backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ExecutionStateStore for SqliteExecutionStateStore {
    async fn load(&self) -> Result<Option<ExecutionState>, IrrigoError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM execution_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;

        let Some((data,)) = row else {
            return Ok(None);
        };
        match serde_json::from_str(&data) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                // an unreadable snapshot is treated as absent so startup can recover
                tracing::warn!(error = %err, "discarding unreadable execution state");
                Ok(None)
            }
        }
    }

    async fn save(&self, state: ExecutionState) -> Result<(), IrrigoError> {
        let data = serde_json::to_string(&state).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(&data)
            .bind(now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }
}

//! `SQLite` implementation of [`SettingsRepository`].
//!
//! The whole record lives in a single JSON row.

use sqlx::SqlitePool;

use irrigo_app::ports::SettingsRepository;
use irrigo_domain::error::IrrigoError;
use irrigo_domain::settings::UserSettings;
use irrigo_domain::time::now;

use crate::error::StorageError;

const UPSERT: &str = r"
    INSERT INTO settings (id, data, updated_at) VALUES (1, ?, ?)
    ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
";

/// `SQLite`-backed settings repository.
#[derive(Clone)]
pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SettingsRepository for SqliteSettingsRepository {
    async fn load(&self) -> Result<Option<UserSettings>, IrrigoError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM settings WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let Some((data,)) = row else {
            return Ok(None);
        };
        let settings = serde_json::from_str(&data).map_err(StorageError::from)?;
        Ok(Some(settings))
    }

    async fn save(&self, settings: UserSettings) -> Result<UserSettings, IrrigoError> {
        let data = serde_json::to_string(&settings).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(&data)
            .bind(now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(settings)
    }
}

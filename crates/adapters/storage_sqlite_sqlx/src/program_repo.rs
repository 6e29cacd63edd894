//! `SQLite` implementation of [`ProgramRepository`].
//!
//! Scalar fields get their own column; recurrence, months and steps are
//! stored as JSON text.

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use irrigo_app::ports::ProgramRepository;
use irrigo_domain::error::IrrigoError;
use irrigo_domain::id::ProgramId;
use irrigo_domain::program::{ActivationTime, MonthSet, Program, ProgramStep, Recurrence};

use crate::error::{StorageError, decode};

struct Wrapper(Program);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Program> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let name: String = row.try_get("name")?;
        let activation_time: String = row.try_get("activation_time")?;
        let recurrence_json: String = row.try_get("recurrence")?;
        let months_json: String = row.try_get("months")?;
        let steps_json: String = row.try_get("steps")?;
        let automatic_enabled: bool = row.try_get("automatic_enabled")?;
        let last_run_date: Option<String> = row.try_get("last_run_date")?;

        let activation_time: ActivationTime = activation_time.parse().map_err(decode)?;
        let recurrence: Recurrence = serde_json::from_str(&recurrence_json).map_err(decode)?;
        let months: MonthSet = serde_json::from_str(&months_json).map_err(decode)?;
        let steps: Vec<ProgramStep> = serde_json::from_str(&steps_json).map_err(decode)?;
        let last_run_date = last_run_date
            .map(|s| s.parse::<NaiveDate>().map_err(decode))
            .transpose()?;

        Ok(Self(Program {
            id: ProgramId::new(id),
            name,
            activation_time,
            recurrence,
            months,
            steps,
            automatic_enabled,
            last_run_date,
        }))
    }
}

const UPSERT: &str = r"
    INSERT INTO programs (id, name, activation_time, recurrence, months, steps, automatic_enabled, last_run_date)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        activation_time = excluded.activation_time,
        recurrence = excluded.recurrence,
        months = excluded.months,
        steps = excluded.steps,
        automatic_enabled = excluded.automatic_enabled,
        last_run_date = excluded.last_run_date
";

/// `SQLite`-backed program repository.
#[derive(Clone)]
pub struct SqliteProgramRepository {
    pool: SqlitePool,
}

impl SqliteProgramRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ProgramRepository for SqliteProgramRepository {
    async fn get_by_id(&self, id: &ProgramId) -> Result<Option<Program>, IrrigoError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM programs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn get_all(&self) -> Result<Vec<Program>, IrrigoError> {
        let rows: Vec<Wrapper> = sqlx::query_as("SELECT * FROM programs")
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        let mut programs: Vec<Program> = rows.into_iter().map(|w| w.0).collect();
        programs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(programs)
    }

    async fn save(&self, program: Program) -> Result<Program, IrrigoError> {
        let recurrence_json = serde_json::to_string(&program.recurrence).map_err(StorageError::from)?;
        let months_json = serde_json::to_string(&program.months).map_err(StorageError::from)?;
        let steps_json = serde_json::to_string(&program.steps).map_err(StorageError::from)?;
        let last_run_date = program.last_run_date.map(|d| d.to_string());

        sqlx::query(UPSERT)
            .bind(program.id.as_str())
            .bind(&program.name)
            .bind(program.activation_time.to_string())
            .bind(&recurrence_json)
            .bind(&months_json)
            .bind(&steps_json)
            .bind(program.automatic_enabled)
            .bind(&last_run_date)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(program)
    }

    async fn delete(&self, id: &ProgramId) -> Result<bool, IrrigoError> {
        let result = sqlx::query("DELETE FROM programs WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> Result<(), IrrigoError> {
        sqlx::query("DELETE FROM programs")
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

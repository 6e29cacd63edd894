//! `SQLite` implementation of [`EventStore`].

use chrono::SecondsFormat;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use irrigo_app::ports::EventStore;
use irrigo_domain::error::IrrigoError;
use irrigo_domain::event::{Event, EventType, Level};
use irrigo_domain::id::{EventId, ProgramId, ZoneId};

use crate::error::{StorageError, decode};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct UnknownValue(String);

struct Wrapper(Event);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: uuid::Uuid = row.try_get("id")?;
        let event_type: String = row.try_get("event_type")?;
        let level: String = row.try_get("level")?;
        let zone_id: Option<u32> = row.try_get("zone_id")?;
        let program_id: Option<String> = row.try_get("program_id")?;
        let message: String = row.try_get("message")?;
        let timestamp: String = row.try_get("timestamp")?;

        let event_type: EventType = event_type
            .parse()
            .map_err(|err| decode(UnknownValue(err)))?;
        let level: Level = level.parse().map_err(|err| decode(UnknownValue(err)))?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp)
            .map_err(decode)?
            .to_utc();

        Ok(Self(Event {
            id: EventId::from_uuid(id),
            event_type,
            level,
            zone_id: zone_id.map(ZoneId),
            program_id: program_id.map(ProgramId::new),
            message,
            timestamp,
        }))
    }
}

const INSERT: &str = r"
    INSERT INTO events (id, event_type, level, zone_id, program_id, message, timestamp)
    VALUES (?, ?, ?, ?, ?, ?, ?)
";

// rowid breaks ties between events stamped within the same microsecond
const SELECT_RECENT: &str = "SELECT * FROM events ORDER BY timestamp DESC, rowid DESC LIMIT ?";

/// `SQLite`-backed event store.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new event store using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl EventStore for SqliteEventStore {
    async fn store(&self, event: Event) -> Result<Event, IrrigoError> {
        sqlx::query(INSERT)
            .bind(event.id.as_uuid())
            .bind(event.event_type.as_str())
            .bind(event.level.as_str())
            .bind(event.zone_id.map(|z| z.0))
            .bind(event.program_id.as_ref().map(ProgramId::as_str))
            .bind(&event.message)
            .bind(event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(event)
    }

    async fn get_recent(&self, limit: usize) -> Result<Vec<Event>, IrrigoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<Wrapper> = sqlx::query_as(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|w| w.0).collect())
    }

    async fn clear(&self) -> Result<(), IrrigoError> {
        let result = sqlx::query("DELETE FROM events")
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        tracing::debug!(removed = result.rows_affected(), "event log cleared");
        Ok(())
    }
}

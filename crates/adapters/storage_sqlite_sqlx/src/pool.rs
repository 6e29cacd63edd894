//! Opening the controller database.
//!
//! File databases run in WAL mode with a busy timeout: the engine and the
//! event recorder write concurrently.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};

use crate::error::StorageError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the programs, settings, execution state and log live.
pub struct Config {
    /// `sqlite:irrigo.db?mode=rwc`, a bare path, or `sqlite::memory:` in tests.
    pub database_url: String,
}

impl Config {
    /// Open the database and bring its schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the URL is invalid, the file cannot be
    /// opened, or a migration fails.
    pub async fn build(self) -> Result<Database, StorageError> {
        Database::open(&self.database_url).await
    }
}

/// An open, migrated database.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn open(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(database_url, "schema up to date");

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for in-flight writes and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

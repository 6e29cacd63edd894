//! # irrigo-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `irrigo-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `irrigo-app` (for port traits) and `irrigo-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod event_store;
pub mod pool;
pub mod program_repo;
pub mod settings_repo;
pub mod state_store;

pub use event_store::SqliteEventStore;
pub use pool::{Config, Database};
pub use program_repo::SqliteProgramRepository;
pub use settings_repo::SqliteSettingsRepository;
pub use state_store::SqliteExecutionStateStore;

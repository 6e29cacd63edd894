//! # irrigo-app
//!
//! Application layer: use-cases, **port definitions** (traits) and the
//! zone-execution engine.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `ZoneDriver`: relay board
//!   - `ProgramRepository`: CRUD for programs
//!   - `SettingsRepository`: user settings record
//!   - `ExecutionStateStore`: engine state survives restarts
//!   - `EventStore`: append & query the system log
//! - Define **driving/inbound ports** as use-case structs:
//!   - `ProgramService`: the program store (validate, save, list, delete)
//!   - `SettingsService`: zone layout and safety limits
//!   - `Engine`: start/stop programs and zones, tick, recover
//! - Provide **in-process infrastructure** (event bus, event recorder, ticker)
//!
//! ## Dependency rule
//! Depends on `irrigo-domain` only (plus `tokio` for sync, time and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod engine;
pub mod event_bus;
pub mod event_recorder;
pub mod ports;
pub mod services;
pub mod ticker;

#[cfg(test)]
pub(crate) mod testing;

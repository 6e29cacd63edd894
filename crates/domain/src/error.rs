//! Common error types used across the workspace.
//!
//! Each failure class has its own typed error converted into [`IrrigoError`]
//! via `#[from]`. Adapters define their own error enums and convert into
//! [`IrrigoError::Storage`].

use crate::id::{ProgramId, ZoneId};

/// Top-level error returned by every engine and service operation.
#[derive(Debug, thiserror::Error)]
pub enum IrrigoError {
    /// Bad program, zone or settings data. Nothing was changed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation is not allowed in the current execution state.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Unknown program or zone.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// The relay driver failed or timed out. The engine is back to idle.
    #[error("hardware fault: {0}")]
    HardwareFault(#[from] DriverError),

    /// Persistence failure.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("name is too long ({len} characters, max {max})")]
    NameTooLong { len: usize, max: usize },
    #[error("invalid activation time {0:?}, expected HH:MM between 00:00 and 23:59")]
    InvalidActivationTime(String),
    #[error("program must contain at least one step")]
    NoSteps,
    #[error("select at least one month")]
    NoMonths,
    #[error("invalid month {0}, expected 1..=12")]
    InvalidMonth(u8),
    #[error("zone {zone_id}: duration {minutes} min is outside 1..={max}")]
    InvalidStepDuration {
        zone_id: ZoneId,
        minutes: u32,
        max: u32,
    },
    #[error("total duration {total} min exceeds {max} min")]
    TotalDurationTooLong { total: u32, max: u32 },
    #[error("zone {0} appears more than once")]
    DuplicateZone(ZoneId),
    #[error("zone {0} is not configured")]
    UnknownZone(ZoneId),
    #[error("custom recurrence interval must be at least 1 day")]
    InvalidInterval,
    #[error("a program named {0:?} already exists")]
    DuplicateName(String),
    #[error("schedule conflict with program {0:?} (same months and activation time)")]
    ScheduleConflict(String),
    #[error("duration must be at least 1 minute")]
    ZeroDuration,
    #[error("duration {minutes} min exceeds the maximum of {max} min")]
    DurationExceedsMax { minutes: u32, max: u32 },
    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("pin {0} is assigned more than once")]
    DuplicatePin(u8),
    #[error("program id must not be empty")]
    EmptyId,
}

/// The requested operation conflicts with what is currently running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("program {0} is already running")]
    AlreadyRunning(ProgramId),
    #[error("a program is running, manual control is locked")]
    ProgramRunning,
    #[error("manual zones are active")]
    ZonesActive,
    #[error("zone {0} is already active")]
    ZoneAlreadyActive(ZoneId),
    #[error("too many active zones (max {max})")]
    TooManyActiveZones { max: u8 },
}

/// A lookup by identifier found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Failure reported by a zone driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("relay for zone {zone_id} failed: {reason}")]
    HardwareFault { zone_id: ZoneId, reason: String },
    #[error("safety relay on pin {pin} failed: {reason}")]
    SafetyRelay { pin: u8, reason: String },
    #[error("driver did not answer within {millis} ms")]
    Timeout { millis: u64 },
}

impl IrrigoError {
    /// Wrap any persistence-layer error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

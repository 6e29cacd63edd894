//! Event: an immutable entry of the system log.
//!
//! Events are produced by the engine and the services whenever a zone or a
//! program changes state, data is saved, or the hardware misbehaves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::id::{EventId, ProgramId, ZoneId};
use crate::time::{Timestamp, now};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ZoneStarted,
    ZoneStopped,
    ProgramStarted,
    ProgramCompleted,
    ProgramStopped,
    ProgramSaved,
    ProgramDeleted,
    SettingsChanged,
    HardwareFault,
    StateRecovered,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZoneStarted => "zone_started",
            Self::ZoneStopped => "zone_stopped",
            Self::ProgramStarted => "program_started",
            Self::ProgramCompleted => "program_completed",
            Self::ProgramStopped => "program_stopped",
            Self::ProgramSaved => "program_saved",
            Self::ProgramDeleted => "program_deleted",
            Self::SettingsChanged => "settings_changed",
            Self::HardwareFault => "hardware_fault",
            Self::StateRecovered => "state_recovered",
        }
    }

    /// Default severity for this kind of event.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::HardwareFault => Level::Error,
            Self::StateRecovered | Self::ProgramStopped => Level::Warning,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zone_started" => Ok(Self::ZoneStarted),
            "zone_stopped" => Ok(Self::ZoneStopped),
            "program_started" => Ok(Self::ProgramStarted),
            "program_completed" => Ok(Self::ProgramCompleted),
            "program_stopped" => Ok(Self::ProgramStopped),
            "program_saved" => Ok(Self::ProgramSaved),
            "program_deleted" => Ok(Self::ProgramDeleted),
            "settings_changed" => Ok(Self::SettingsChanged),
            "hardware_fault" => Ok(Self::HardwareFault),
            "state_recovered" => Ok(Self::StateRecovered),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Severity shown in the log viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown level: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: EventType,
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<ZoneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<ProgramId>,
    pub message: String,
    pub timestamp: Timestamp,
}

impl Event {
    /// New event stamped with the current time and the type's default level.
    #[must_use]
    pub fn new(event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            level: event_type.level(),
            zone_id: None,
            program_id: None,
            message: message.into(),
            timestamp: now(),
        }
    }

    #[must_use]
    pub fn with_zone(mut self, zone_id: ZoneId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    #[must_use]
    pub fn with_program(mut self, program_id: ProgramId) -> Self {
        self.program_id = Some(program_id);
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

//! Program: a named, schedulable sequence of zone activations.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{IrrigoError, ValidationError};
use crate::id::{ProgramId, ZoneId};

/// Longest program name, in characters.
pub const MAX_NAME_LEN: usize = 16;
/// Longest single step, in minutes.
pub const MAX_STEP_MINUTES: u32 = 180;
/// Longest whole program, in minutes.
pub const MAX_TOTAL_MINUTES: u32 = 1440;

/// Local wall-clock time at which an automatic program fires (`HH:MM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActivationTime {
    hour: u8,
    minute: u8,
}

impl ActivationTime {
    /// Build from hour and minute.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidActivationTime`] outside 00:00–23:59.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidActivationTime(format!(
                "{hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    #[must_use]
    pub fn hour(self) -> u8 {
        self.hour
    }

    #[must_use]
    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Whether `time` falls inside this activation minute.
    #[must_use]
    pub fn matches(self, time: NaiveTime) -> bool {
        time.hour() == u32::from(self.hour) && time.minute() == u32::from(self.minute)
    }
}

impl FromStr for ActivationTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidActivationTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ActivationTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActivationTime> for String {
    fn from(value: ActivationTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ActivationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Set of calendar months (1 = January) in which a program may run.
///
/// Serialized as a sorted array of month numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct MonthSet(u16);

impl MonthSet {
    /// All twelve months.
    pub const ALL: Self = Self(0x0FFF);

    /// Build from month numbers.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidMonth`] for values outside 1..=12.
    pub fn from_months(months: impl IntoIterator<Item = u8>) -> Result<Self, ValidationError> {
        let mut bits = 0u16;
        for month in months {
            if !(1..=12).contains(&month) {
                return Err(ValidationError::InvalidMonth(month));
            }
            bits |= 1 << (month - 1);
        }
        Ok(Self(bits))
    }

    #[must_use]
    pub fn contains(self, month: u32) -> bool {
        (1..=12).contains(&month) && self.0 & (1 << (month - 1)) != 0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Month numbers in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (1u8..=12).filter(move |m| self.0 & (1 << (m - 1)) != 0)
    }
}

impl TryFrom<Vec<u8>> for MonthSet {
    type Error = ValidationError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_months(value)
    }
}

impl From<MonthSet> for Vec<u8> {
    fn from(value: MonthSet) -> Self {
        value.iter().collect()
    }
}

/// How often an automatic program repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recurrence {
    /// Every day at the activation time.
    Daily,
    /// Every second day.
    EveryOtherDay,
    /// Every `interval_days` days.
    Custom { interval_days: u32 },
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::EveryOtherDay => f.write_str("every_other_day"),
            Self::Custom { interval_days } => write!(f, "every {interval_days} days"),
        }
    }
}

/// One zone activation within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStep {
    pub zone_id: ZoneId,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
}

impl ProgramStep {
    #[must_use]
    pub fn new(zone_id: u32, duration_minutes: u32) -> Self {
        Self {
            zone_id: ZoneId(zone_id),
            duration_minutes,
        }
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_minutes.saturating_mul(60)
    }
}

/// A named, schedulable sequence of zone activations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    pub activation_time: ActivationTime,
    pub recurrence: Recurrence,
    pub months: MonthSet,
    pub steps: Vec<ProgramStep>,
    #[serde(default = "default_automatic")]
    pub automatic_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_date: Option<NaiveDate>,
}

fn default_automatic() -> bool {
    true
}

impl Program {
    /// Create a builder for constructing a [`Program`].
    #[must_use]
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    /// Sum of all step durations, in minutes.
    #[must_use]
    pub fn total_minutes(&self) -> u32 {
        self.steps
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.duration_minutes))
    }

    /// Check domain invariants that do not depend on other programs or the zone layout.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::Validation`] when:
    /// - `name` is empty or longer than [`MAX_NAME_LEN`] characters
    /// - `steps` is empty, a step lasts outside 1..=[`MAX_STEP_MINUTES`],
    ///   a zone repeats, or the total exceeds [`MAX_TOTAL_MINUTES`]
    /// - `months` is empty
    /// - a custom recurrence has a zero interval
    pub fn validate(&self) -> Result<(), IrrigoError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong {
                len,
                max: MAX_NAME_LEN,
            }
            .into());
        }
        if self.steps.is_empty() {
            return Err(ValidationError::NoSteps.into());
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !(1..=MAX_STEP_MINUTES).contains(&step.duration_minutes) {
                return Err(ValidationError::InvalidStepDuration {
                    zone_id: step.zone_id,
                    minutes: step.duration_minutes,
                    max: MAX_STEP_MINUTES,
                }
                .into());
            }
            if !seen.insert(step.zone_id) {
                return Err(ValidationError::DuplicateZone(step.zone_id).into());
            }
        }
        let total = self.total_minutes();
        if total > MAX_TOTAL_MINUTES {
            return Err(ValidationError::TotalDurationTooLong {
                total,
                max: MAX_TOTAL_MINUTES,
            }
            .into());
        }
        if self.months.is_empty() {
            return Err(ValidationError::NoMonths.into());
        }
        if let Recurrence::Custom { interval_days: 0 } = self.recurrence {
            return Err(ValidationError::InvalidInterval.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    id: Option<ProgramId>,
    name: Option<String>,
    activation_time: Option<String>,
    recurrence: Option<Recurrence>,
    months: Vec<u8>,
    steps: Vec<ProgramStep>,
    automatic_enabled: Option<bool>,
    last_run_date: Option<NaiveDate>,
}

impl ProgramBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<ProgramId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn activation_time(mut self, time: impl Into<String>) -> Self {
        self.activation_time = Some(time.into());
        self
    }

    #[must_use]
    pub fn recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    #[must_use]
    pub fn months(mut self, months: impl IntoIterator<Item = u8>) -> Self {
        self.months.extend(months);
        self
    }

    #[must_use]
    pub fn step(mut self, zone_id: u32, duration_minutes: u32) -> Self {
        self.steps.push(ProgramStep::new(zone_id, duration_minutes));
        self
    }

    #[must_use]
    pub fn steps(mut self, steps: impl IntoIterator<Item = ProgramStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    #[must_use]
    pub fn automatic_enabled(mut self, enabled: bool) -> Self {
        self.automatic_enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn last_run_date(mut self, date: NaiveDate) -> Self {
        self.last_run_date = Some(date);
        self
    }

    /// Consume the builder, validate, and return a [`Program`].
    ///
    /// The id defaults to empty; the program store assigns one on save.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::Validation`] if a field is malformed or an
    /// invariant of [`Program::validate`] fails.
    pub fn build(self) -> Result<Program, IrrigoError> {
        let activation_time = self
            .activation_time
            .as_deref()
            .unwrap_or_default()
            .parse::<ActivationTime>()?;
        let program = Program {
            id: self.id.unwrap_or_else(|| ProgramId::new("")),
            name: self.name.unwrap_or_default(),
            activation_time,
            recurrence: self.recurrence.unwrap_or(Recurrence::Daily),
            months: MonthSet::from_months(self.months)?,
            steps: self.steps,
            automatic_enabled: self.automatic_enabled.unwrap_or(true),
            last_run_date: self.last_run_date,
        };
        program.validate()?;
        Ok(program)
    }
}

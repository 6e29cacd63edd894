//! Safety limiter: the single gate every zone activation passes through.

use crate::error::{ConflictError, IrrigoError, ValidationError};
use crate::execution::ExecutionState;
use crate::id::ZoneId;
use crate::settings::SafetyConfig;

/// A zone the caller wants to switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRequest {
    pub zone_id: ZoneId,
    pub duration_minutes: u32,
}

/// Why an activation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    TooManyActiveZones { max: u8 },
    ZoneAlreadyActive(ZoneId),
    DurationExceedsMax { minutes: u32, max: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    /// Turn a denial into the error reported to callers.
    ///
    /// # Errors
    ///
    /// Returns the [`IrrigoError`] matching the [`Denial`].
    pub fn into_result(self) -> Result<(), IrrigoError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(denial) => Err(denial.into()),
        }
    }
}

impl From<Denial> for IrrigoError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::TooManyActiveZones { max } => ConflictError::TooManyActiveZones { max }.into(),
            Denial::ZoneAlreadyActive(zone_id) => ConflictError::ZoneAlreadyActive(zone_id).into(),
            Denial::DurationExceedsMax { minutes, max } => {
                ValidationError::DurationExceedsMax { minutes, max }.into()
            }
        }
    }
}

/// Decide whether `request` may be energized on top of `state`.
#[must_use]
pub fn can_activate(
    request: ActivationRequest,
    state: &ExecutionState,
    config: &SafetyConfig,
) -> Decision {
    if request.duration_minutes > config.max_zone_duration_minutes {
        return Decision::Deny(Denial::DurationExceedsMax {
            minutes: request.duration_minutes,
            max: config.max_zone_duration_minutes,
        });
    }
    if state.is_zone_active(request.zone_id) {
        return Decision::Deny(Denial::ZoneAlreadyActive(request.zone_id));
    }
    if state.active_count() >= usize::from(config.max_active_zones) {
        return Decision::Deny(Denial::TooManyActiveZones {
            max: config.max_active_zones,
        });
    }
    Decision::Allow
}

//! User settings: zone layout, safety limits and the automatic-programs switch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{IrrigoError, ValidationError};
use crate::zone::{GpioPin, Zone};

/// Upper bound for `max_active_zones`.
pub const MAX_ACTIVE_ZONES_LIMIT: u8 = 8;
/// Upper bound for `activation_delay` in seconds.
pub const MAX_ACTIVATION_DELAY_SECONDS: u32 = 60;

/// The relay that cuts power to the whole valve bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyRelay {
    pub pin: GpioPin,
}

/// System-wide limits consulted before every activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub max_active_zones: u8,
    /// Seconds with every zone off between two program steps.
    #[serde(rename = "activation_delay")]
    pub activation_delay_seconds: u32,
    /// Longest single activation, in minutes.
    #[serde(rename = "max_zone_duration")]
    pub max_zone_duration_minutes: u32,
    pub safety_relay: SafetyRelay,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_active_zones: 3,
            activation_delay_seconds: 0,
            max_zone_duration_minutes: 180,
            safety_relay: SafetyRelay { pin: 13 },
        }
    }
}

impl SafetyConfig {
    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfRange`] for the first field outside its range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_range(
            "max_active_zones",
            u32::from(self.max_active_zones),
            1,
            u32::from(MAX_ACTIVE_ZONES_LIMIT),
        )?;
        check_range(
            "activation_delay",
            self.activation_delay_seconds,
            0,
            MAX_ACTIVATION_DELAY_SECONDS,
        )?;
        check_range(
            "max_zone_duration",
            self.max_zone_duration_minutes,
            1,
            u32::MAX,
        )?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Everything the operator configures on the settings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub zones: Vec<Zone>,
    #[serde(flatten)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub automatic_programs_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        let zones = (0u8..8)
            .map(|i| Zone::new(u32::from(i), format!("Zona {}", i + 1), 14 + i))
            .collect();
        Self {
            zones,
            safety: SafetyConfig::default(),
            automatic_programs_enabled: false,
        }
    }
}

impl UserSettings {
    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::Validation`] when:
    /// - a safety limit is out of range
    /// - a zone name is empty
    /// - two zones share an id ([`ValidationError::DuplicateZone`])
    /// - two relays share a pin, the safety relay included ([`ValidationError::DuplicatePin`])
    pub fn validate(&self) -> Result<(), IrrigoError> {
        self.safety.validate()?;

        let mut ids = HashSet::new();
        let mut pins = HashSet::from([self.safety.safety_relay.pin]);
        for zone in &self.zones {
            if zone.name.trim().is_empty() {
                return Err(ValidationError::EmptyName.into());
            }
            if !ids.insert(zone.id) {
                return Err(ValidationError::DuplicateZone(zone.id).into());
            }
            if !pins.insert(zone.pin) {
                return Err(ValidationError::DuplicatePin(zone.pin).into());
            }
        }
        Ok(())
    }
}

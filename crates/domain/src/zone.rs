//! Zone: one physical irrigation valve/relay circuit.

use serde::{Deserialize, Serialize};

use crate::id::ZoneId;

/// GPIO pin number driving a relay.
pub type GpioPin = u8;

/// Static configuration of a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub pin: GpioPin,
    /// Hidden zones stay wired but are not offered in the UI.
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Zone {
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, pin: GpioPin) -> Self {
        Self {
            id: ZoneId(id),
            name: name.into(),
            pin,
            visible: true,
        }
    }
}

/// Find a zone by id in a configured zone list.
#[must_use]
pub fn find(zones: &[Zone], id: ZoneId) -> Option<&Zone> {
    zones.iter().find(|z| z.id == id)
}

/// Whether a zone's relay is currently energized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Active,
    Idle,
}

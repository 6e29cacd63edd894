//! Zone driver port: the relay board.
//!
//! The engine is the only caller. Every call is bounded by a timeout on the
//! engine side, so implementations may block on slow hardware.

use std::future::Future;
use std::time::Duration;

use irrigo_domain::error::DriverError;
use irrigo_domain::id::ZoneId;
use irrigo_domain::zone::{GpioPin, Zone, ZoneStatus};

/// Switches zone relays and the master safety relay.
pub trait ZoneDriver {
    /// Energize the relay of `zone`. `duration` is informative; the engine
    /// decides when to switch it off.
    fn activate(
        &self,
        zone: &Zone,
        duration: Duration,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Release the relay of `zone`. Releasing an idle zone succeeds.
    fn deactivate(&self, zone: &Zone) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Current relay position of a zone.
    fn status(&self, zone_id: ZoneId) -> impl Future<Output = ZoneStatus> + Send;

    /// Switch the master relay that powers the whole valve bank.
    fn set_safety_relay(
        &self,
        pin: GpioPin,
        on: bool,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;
}

impl<T: ZoneDriver + Send + Sync> ZoneDriver for std::sync::Arc<T> {
    fn activate(
        &self,
        zone: &Zone,
        duration: Duration,
    ) -> impl Future<Output = Result<(), DriverError>> + Send {
        (**self).activate(zone, duration)
    }

    fn deactivate(&self, zone: &Zone) -> impl Future<Output = Result<(), DriverError>> + Send {
        (**self).deactivate(zone)
    }

    fn status(&self, zone_id: ZoneId) -> impl Future<Output = ZoneStatus> + Send {
        (**self).status(zone_id)
    }

    fn set_safety_relay(
        &self,
        pin: GpioPin,
        on: bool,
    ) -> impl Future<Output = Result<(), DriverError>> + Send {
        (**self).set_safety_relay(pin, on)
    }
}

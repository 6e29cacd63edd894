//! # irrigo-adapter-virtual
//!
//! Simulated relay board implementing the `ZoneDriver` port.
//!
//! Every zone relay and the master safety relay are kept in memory. The
//! board can be told to fail specific zones or to answer slowly, which is
//! how the engine's fail-safe paths get exercised without hardware.
//!
//! ## Dependency rule
//!
//! Depends on `irrigo-app` (port traits) and `irrigo-domain` only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use irrigo_app::ports::ZoneDriver;
use irrigo_domain::error::DriverError;
use irrigo_domain::id::ZoneId;
use irrigo_domain::zone::{GpioPin, Zone, ZoneStatus};

#[derive(Debug, Default)]
struct Board {
    relays: BTreeMap<ZoneId, bool>,
    safety_relay: Option<(GpioPin, bool)>,
    faulty: BTreeSet<ZoneId>,
}

/// In-memory relay board.
#[derive(Debug, Default)]
pub struct VirtualZoneDriver {
    board: Mutex<Board>,
    latency: Duration,
}

impl VirtualZoneDriver {
    /// A board that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every relay operation by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make activations of `zone_id` fail until [`Self::repair`] is called.
    pub fn inject_fault(&self, zone_id: ZoneId) {
        self.lock().faulty.insert(zone_id);
    }

    /// Clear a fault injected with [`Self::inject_fault`].
    pub fn repair(&self, zone_id: ZoneId) {
        self.lock().faulty.remove(&zone_id);
    }

    /// Zones whose relay is currently closed, in id order.
    #[must_use]
    pub fn energized_zones(&self) -> Vec<ZoneId> {
        self.lock()
            .relays
            .iter()
            .filter(|(_, on)| **on)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether the master relay is currently on.
    #[must_use]
    pub fn safety_relay_on(&self) -> bool {
        self.lock().safety_relay.is_some_and(|(_, on)| on)
    }

    fn lock(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn settle(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl ZoneDriver for VirtualZoneDriver {
    async fn activate(&self, zone: &Zone, duration: Duration) -> Result<(), DriverError> {
        self.settle().await;
        let mut board = self.lock();
        if board.faulty.contains(&zone.id) {
            return Err(DriverError::HardwareFault {
                zone_id: zone.id,
                reason: format!("no response from relay on pin {}", zone.pin),
            });
        }
        board.relays.insert(zone.id, true);
        tracing::info!(zone_id = %zone.id, pin = zone.pin, seconds = duration.as_secs(), "valve opened");
        Ok(())
    }

    async fn deactivate(&self, zone: &Zone) -> Result<(), DriverError> {
        self.settle().await;
        if self.lock().relays.insert(zone.id, false) == Some(true) {
            tracing::info!(zone_id = %zone.id, pin = zone.pin, "valve closed");
        }
        Ok(())
    }

    async fn status(&self, zone_id: ZoneId) -> ZoneStatus {
        if self.lock().relays.get(&zone_id).copied().unwrap_or(false) {
            ZoneStatus::Active
        } else {
            ZoneStatus::Idle
        }
    }

    async fn set_safety_relay(&self, pin: GpioPin, on: bool) -> Result<(), DriverError> {
        self.settle().await;
        self.lock().safety_relay = Some((pin, on));
        tracing::debug!(pin, on, "safety relay switched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: u32) -> Zone {
        Zone::new(id, format!("Zona {}", id + 1), 14 + u8::try_from(id).unwrap())
    }

    #[tokio::test]
    async fn should_report_active_after_activation() {
        let driver = VirtualZoneDriver::new();
        driver
            .activate(&zone(2), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(driver.status(ZoneId(2)).await, ZoneStatus::Active);
        assert_eq!(driver.status(ZoneId(1)).await, ZoneStatus::Idle);
        assert_eq!(driver.energized_zones(), vec![ZoneId(2)]);
    }

    #[tokio::test]
    async fn should_report_idle_after_deactivation() {
        let driver = VirtualZoneDriver::new();
        driver
            .activate(&zone(0), Duration::from_secs(60))
            .await
            .unwrap();
        driver.deactivate(&zone(0)).await.unwrap();

        assert_eq!(driver.status(ZoneId(0)).await, ZoneStatus::Idle);
        assert!(driver.energized_zones().is_empty());
    }

    #[tokio::test]
    async fn should_accept_deactivation_when_zone_never_activated() {
        let driver = VirtualZoneDriver::new();
        assert!(driver.deactivate(&zone(5)).await.is_ok());
    }

    #[tokio::test]
    async fn should_fail_activation_when_fault_injected() {
        let driver = VirtualZoneDriver::new();
        driver.inject_fault(ZoneId(1));

        let result = driver.activate(&zone(1), Duration::from_secs(60)).await;
        assert!(matches!(
            result,
            Err(DriverError::HardwareFault { zone_id: ZoneId(1), .. })
        ));
        assert_eq!(driver.status(ZoneId(1)).await, ZoneStatus::Idle);

        driver.repair(ZoneId(1));
        assert!(driver.activate(&zone(1), Duration::from_secs(60)).await.is_ok());
    }

    #[tokio::test]
    async fn should_track_safety_relay() {
        let driver = VirtualZoneDriver::new();
        assert!(!driver.safety_relay_on());
        driver.set_safety_relay(13, true).await.unwrap();
        assert!(driver.safety_relay_on());
        driver.set_safety_relay(13, false).await.unwrap();
        assert!(!driver.safety_relay_on());
    }

    #[tokio::test(start_paused = true)]
    async fn should_wait_for_latency_before_switching() {
        let driver = VirtualZoneDriver::new().with_latency(Duration::from_millis(500));
        let started = tokio::time::Instant::now();
        driver
            .activate(&zone(0), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(500));
    }
}

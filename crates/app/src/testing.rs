//! In-memory port implementations shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use irrigo_domain::error::{DriverError, IrrigoError};
use irrigo_domain::event::{Event, EventType};
use irrigo_domain::execution::ExecutionState;
use irrigo_domain::id::{ProgramId, ZoneId};
use irrigo_domain::program::Program;
use irrigo_domain::settings::UserSettings;
use irrigo_domain::zone::{GpioPin, Zone, ZoneStatus};

use crate::ports::{
    EventPublisher, ExecutionStateStore, ProgramRepository, SettingsRepository, ZoneDriver,
};

#[derive(Default)]
pub struct InMemoryProgramRepo {
    store: Mutex<HashMap<ProgramId, Program>>,
}

impl InMemoryProgramRepo {
    /// Seed programs without going through the store's validation.
    pub fn with(programs: impl IntoIterator<Item = Program>) -> Self {
        Self {
            store: Mutex::new(programs.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }
}

impl ProgramRepository for InMemoryProgramRepo {
    async fn get_by_id(&self, id: &ProgramId) -> Result<Option<Program>, IrrigoError> {
        Ok(self.store.lock().unwrap().get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Program>, IrrigoError> {
        Ok(self.store.lock().unwrap().values().cloned().collect())
    }

    async fn save(&self, program: Program) -> Result<Program, IrrigoError> {
        self.store
            .lock()
            .unwrap()
            .insert(program.id.clone(), program.clone());
        Ok(program)
    }

    async fn delete(&self, id: &ProgramId) -> Result<bool, IrrigoError> {
        Ok(self.store.lock().unwrap().remove(id).is_some())
    }

    async fn delete_all(&self) -> Result<(), IrrigoError> {
        self.store.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepo {
    settings: Mutex<Option<UserSettings>>,
    down: Arc<AtomicBool>,
}

impl InMemorySettingsRepo {
    pub fn with(settings: UserSettings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
            down: Arc::default(),
        }
    }

    /// While the returned flag is set, reads fail with a storage error.
    pub fn outage(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.down)
    }
}

impl SettingsRepository for InMemorySettingsRepo {
    async fn load(&self) -> Result<Option<UserSettings>, IrrigoError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IrrigoError::Storage("settings table unreachable".into()));
        }
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn save(&self, settings: UserSettings) -> Result<UserSettings, IrrigoError> {
        *self.settings.lock().unwrap() = Some(settings.clone());
        Ok(settings)
    }
}

#[derive(Default)]
pub struct InMemoryStateStore {
    pub state: Mutex<Option<ExecutionState>>,
}

impl ExecutionStateStore for InMemoryStateStore {
    async fn load(&self) -> Result<Option<ExecutionState>, IrrigoError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save(&self, state: ExecutionState) -> Result<(), IrrigoError> {
        *self.state.lock().unwrap() = Some(state);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    pub fn types(&self) -> Vec<EventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect()
    }
}

impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: Event) -> Result<(), IrrigoError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCall {
    Activate(ZoneId),
    Deactivate(ZoneId),
    Relay(bool),
}

/// Records every call; can fail or hang on demand.
#[derive(Default)]
pub struct SpyDriver {
    pub calls: Mutex<Vec<DriverCall>>,
    active: Mutex<HashMap<ZoneId, bool>>,
    fail_on: Mutex<Option<ZoneId>>,
    fail_off: Mutex<Option<ZoneId>>,
    hang: AtomicBool,
}

impl SpyDriver {
    pub fn fail_on(&self, zone_id: ZoneId) {
        *self.fail_on.lock().unwrap() = Some(zone_id);
    }

    pub fn fail_off(&self, zone_id: ZoneId) {
        *self.fail_off.lock().unwrap() = Some(zone_id);
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn activations(&self) -> Vec<ZoneId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Activate(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn energized(&self) -> usize {
        self.active.lock().unwrap().values().filter(|on| **on).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl ZoneDriver for SpyDriver {
    async fn activate(&self, zone: &Zone, _duration: Duration) -> Result<(), DriverError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.calls
            .lock()
            .unwrap()
            .push(DriverCall::Activate(zone.id));
        if *self.fail_on.lock().unwrap() == Some(zone.id) {
            return Err(DriverError::HardwareFault {
                zone_id: zone.id,
                reason: "relay stuck".to_string(),
            });
        }
        self.active.lock().unwrap().insert(zone.id, true);
        Ok(())
    }

    async fn deactivate(&self, zone: &Zone) -> Result<(), DriverError> {
        self.calls
            .lock()
            .unwrap()
            .push(DriverCall::Deactivate(zone.id));
        if *self.fail_off.lock().unwrap() == Some(zone.id) {
            return Err(DriverError::HardwareFault {
                zone_id: zone.id,
                reason: "relay welded".to_string(),
            });
        }
        self.active.lock().unwrap().insert(zone.id, false);
        Ok(())
    }

    async fn status(&self, zone_id: ZoneId) -> ZoneStatus {
        if self.active.lock().unwrap().get(&zone_id).copied() == Some(true) {
            ZoneStatus::Active
        } else {
            ZoneStatus::Idle
        }
    }

    async fn set_safety_relay(&self, _pin: GpioPin, on: bool) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(DriverCall::Relay(on));
        Ok(())
    }
}

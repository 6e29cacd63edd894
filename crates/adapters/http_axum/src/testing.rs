//! In-memory ports and request helpers for the handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use irrigo_app::engine::{Engine, EngineConfig};
use irrigo_app::event_bus::InProcessEventBus;
use irrigo_app::ports::{
    EventStore, ExecutionStateStore, ProgramRepository, SettingsRepository, ZoneDriver,
};
use irrigo_app::services::program_service::ProgramService;
use irrigo_app::services::settings_service::SettingsService;
use irrigo_domain::error::{DriverError, IrrigoError};
use irrigo_domain::event::Event;
use irrigo_domain::execution::ExecutionState;
use irrigo_domain::id::{ProgramId, ZoneId};
use irrigo_domain::program::Program;
use irrigo_domain::settings::UserSettings;
use irrigo_domain::zone::{GpioPin, Zone, ZoneStatus};

use crate::state::AppState;

#[derive(Default)]
pub struct MemoryPrograms(Mutex<HashMap<ProgramId, Program>>);

impl ProgramRepository for MemoryPrograms {
    async fn get_by_id(&self, id: &ProgramId) -> Result<Option<Program>, IrrigoError> {
        Ok(self.0.lock().unwrap().get(id).cloned())
    }
    async fn get_all(&self) -> Result<Vec<Program>, IrrigoError> {
        Ok(self.0.lock().unwrap().values().cloned().collect())
    }
    async fn save(&self, program: Program) -> Result<Program, IrrigoError> {
        self.0
            .lock()
            .unwrap()
            .insert(program.id.clone(), program.clone());
        Ok(program)
    }
    async fn delete(&self, id: &ProgramId) -> Result<bool, IrrigoError> {
        Ok(self.0.lock().unwrap().remove(id).is_some())
    }
    async fn delete_all(&self) -> Result<(), IrrigoError> {
        self.0.lock().unwrap().clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySettings(Mutex<Option<UserSettings>>);

impl SettingsRepository for MemorySettings {
    async fn load(&self) -> Result<Option<UserSettings>, IrrigoError> {
        Ok(self.0.lock().unwrap().clone())
    }
    async fn save(&self, settings: UserSettings) -> Result<UserSettings, IrrigoError> {
        *self.0.lock().unwrap() = Some(settings.clone());
        Ok(settings)
    }
}

#[derive(Default)]
pub struct MemoryState(Mutex<Option<ExecutionState>>);

impl ExecutionStateStore for MemoryState {
    async fn load(&self) -> Result<Option<ExecutionState>, IrrigoError> {
        Ok(self.0.lock().unwrap().clone())
    }
    async fn save(&self, state: ExecutionState) -> Result<(), IrrigoError> {
        *self.0.lock().unwrap() = Some(state);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryEvents(pub Mutex<Vec<Event>>);

impl EventStore for MemoryEvents {
    async fn store(&self, event: Event) -> Result<Event, IrrigoError> {
        self.0.lock().unwrap().push(event.clone());
        Ok(event)
    }
    async fn get_recent(&self, limit: usize) -> Result<Vec<Event>, IrrigoError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
    async fn clear(&self) -> Result<(), IrrigoError> {
        self.0.lock().unwrap().clear();
        Ok(())
    }
}

/// Relay board that fails on one zone when asked to.
#[derive(Default)]
pub struct StubDriver {
    active: Mutex<HashMap<ZoneId, bool>>,
    pub broken: Mutex<Option<ZoneId>>,
}

impl ZoneDriver for StubDriver {
    async fn activate(&self, zone: &Zone, _duration: Duration) -> Result<(), DriverError> {
        if *self.broken.lock().unwrap() == Some(zone.id) {
            return Err(DriverError::HardwareFault {
                zone_id: zone.id,
                reason: "relay stuck".to_string(),
            });
        }
        self.active.lock().unwrap().insert(zone.id, true);
        Ok(())
    }
    async fn deactivate(&self, zone: &Zone) -> Result<(), DriverError> {
        self.active.lock().unwrap().insert(zone.id, false);
        Ok(())
    }
    async fn status(&self, zone_id: ZoneId) -> ZoneStatus {
        if self.active.lock().unwrap().get(&zone_id) == Some(&true) {
            ZoneStatus::Active
        } else {
            ZoneStatus::Idle
        }
    }
    async fn set_safety_relay(&self, _pin: GpioPin, _on: bool) -> Result<(), DriverError> {
        Ok(())
    }
}

pub type TestState = AppState<
    Arc<StubDriver>,
    MemoryPrograms,
    MemorySettings,
    MemoryState,
    InProcessEventBus,
    MemoryEvents,
>;

pub fn test_state() -> TestState {
    harness().0
}

/// State plus a handle on the relay board behind the engine.
pub fn harness() -> (TestState, Arc<StubDriver>) {
    let driver = Arc::new(StubDriver::default());
    let engine = Engine::new(
        Arc::clone(&driver),
        ProgramService::new(MemoryPrograms::default()),
        SettingsService::new(MemorySettings::default()),
        MemoryState::default(),
        InProcessEventBus::new(16),
        EngineConfig::default(),
    );
    (AppState::new(engine, MemoryEvents::default()), driver)
}

pub fn app(state: &TestState) -> Router {
    crate::router::build(state.clone())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

pub async fn get(state: &TestState, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app(state), request).await
}

pub async fn post(
    state: &TestState,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app(state), request).await
}

pub fn morning_program() -> serde_json::Value {
    serde_json::json!({
        "name": "Mattino",
        "activation_time": "06:00",
        "recurrence": {"type": "daily"},
        "months": [4, 5, 6, 7, 8, 9],
        "steps": [{"zone_id": 0, "duration": 10}, {"zone_id": 1, "duration": 5}]
    })
}

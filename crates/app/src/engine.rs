//! Engine: the single owner of relay state.
//!
//! Every mutation (API calls, ticks, automatic triggers) goes through one
//! `tokio::sync::Mutex`; the safety check, the driver call and the state
//! update happen under that lock. Readers get a `watch` snapshot and never
//! wait on it.
//!
//! Every driver call is bounded by [`EngineConfig::driver_timeout`]. A failed
//! or timed-out activation is rolled back (zone and master relay released),
//! recorded in [`ExecutionState::fault`] and reported as
//! [`IrrigoError::HardwareFault`]. There are no retries.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{Mutex, watch};

use irrigo_domain::error::{ConflictError, DriverError, IrrigoError, NotFoundError, ValidationError};
use irrigo_domain::event::{Event, EventType};
use irrigo_domain::execution::{Effect, ExecutionState, Fault, Phase, ProgramRun, Trigger, ZoneRun};
use irrigo_domain::id::{ProgramId, ZoneId};
use irrigo_domain::program::Program;
use irrigo_domain::safety::{self, ActivationRequest};
use irrigo_domain::schedule;
use irrigo_domain::settings::UserSettings;
use irrigo_domain::time::{self, Timestamp, WallClock};
use irrigo_domain::zone::{self, Zone, ZoneStatus};

use crate::ports::{
    EventPublisher, ExecutionStateStore, ProgramRepository, SettingsRepository, ZoneDriver,
};
use crate::services::program_service::ProgramService;
use crate::services::settings_service::SettingsService;

/// Longest gap, in seconds, a single tick accounts for.
pub const MAX_TICK_SECONDS: i64 = 60;

/// Runtime knobs of the [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound for every driver call.
    pub driver_timeout: Duration,
    /// How instants map to the local time schedules are written in.
    pub wall_clock: WallClock,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            driver_timeout: Duration::from_secs(2),
            wall_clock: WallClock::System,
        }
    }
}

#[derive(Default)]
struct Inner {
    state: ExecutionState,
    relay_on: bool,
    last_tick: Option<Timestamp>,
    /// Local date on which each program was last triggered or skipped.
    fired: HashMap<ProgramId, NaiveDate>,
}

impl Inner {
    /// Whole seconds since the previous tick, clamped to `0..=MAX_TICK_SECONDS`.
    ///
    /// Sub-second remainders stay on the books so 1 s ticks with jitter do
    /// not lose time.
    fn elapsed(&mut self, now: Timestamp) -> u32 {
        let Some(previous) = self.last_tick else {
            self.last_tick = Some(now);
            return 0;
        };
        let secs = (now - previous).num_seconds();
        if (0..=MAX_TICK_SECONDS).contains(&secs) {
            self.last_tick = Some(previous + chrono::Duration::seconds(secs));
        } else {
            self.last_tick = Some(now);
        }
        u32::try_from(secs.clamp(0, MAX_TICK_SECONDS)).unwrap_or(0)
    }
}

struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates the driver, the program store, the settings and the execution state.
pub struct Engine<D, PR, SR, SS, EP> {
    driver: D,
    programs: ProgramService<PR>,
    settings: SettingsService<SR>,
    state_store: SS,
    publisher: EP,
    config: EngineConfig,
    inner: Mutex<Inner>,
    snapshot: watch::Sender<ExecutionState>,
    ticking: AtomicBool,
}

impl<D, PR, SR, SS, EP> Engine<D, PR, SR, SS, EP>
where
    D: ZoneDriver + Send + Sync,
    PR: ProgramRepository + Send + Sync,
    SR: SettingsRepository + Send + Sync,
    SS: ExecutionStateStore + Send + Sync,
    EP: EventPublisher + Send + Sync,
{
    /// Create an idle engine. Call [`recover`](Self::recover) before serving.
    pub fn new(
        driver: D,
        programs: ProgramService<PR>,
        settings: SettingsService<SR>,
        state_store: SS,
        publisher: EP,
        config: EngineConfig,
    ) -> Self {
        let (snapshot, _) = watch::channel(ExecutionState::default());
        Self {
            driver,
            programs,
            settings,
            state_store,
            publisher,
            config,
            inner: Mutex::new(Inner::default()),
            snapshot,
            ticking: AtomicBool::new(false),
        }
    }

    /// Latest published execution state.
    pub fn state(&self) -> ExecutionState {
        self.snapshot.borrow().clone()
    }

    /// Receive every published execution state.
    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.snapshot.subscribe()
    }

    /// Current user settings.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the settings repository.
    pub async fn settings(&self) -> Result<UserSettings, IrrigoError> {
        self.settings.get().await
    }

    /// All programs keyed by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the program repository.
    pub async fn programs(&self) -> Result<BTreeMap<ProgramId, Program>, IrrigoError> {
        self.programs.list().await
    }

    /// One program by id.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] for an unknown id.
    pub async fn program(&self, id: &ProgramId) -> Result<Program, IrrigoError> {
        self.programs.get(id).await
    }

    // -- program execution ---------------------------------------------------

    /// Start a program from its first step.
    ///
    /// # Errors
    ///
    /// - [`ConflictError::AlreadyRunning`] while another program runs
    /// - [`ConflictError::ZonesActive`] while manual zones are on
    /// - [`IrrigoError::NotFound`] for an unknown program
    /// - [`IrrigoError::Validation`] when a step targets a missing zone or
    ///   exceeds the maximum zone duration
    /// - [`IrrigoError::HardwareFault`] when the first zone cannot be switched on
    #[tracing::instrument(skip(self), fields(program_id = %id))]
    pub async fn start_program(&self, id: &ProgramId, trigger: Trigger) -> Result<(), IrrigoError> {
        let mut inner = self.inner.lock().await;
        let settings = self.settings.get().await?;
        self.start_program_locked(&mut inner, id, trigger, &settings, time::now())
            .await
    }

    /// Stop whatever is running, program and manual zones alike.
    ///
    /// Succeeds when already idle.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::HardwareFault`] when a zone fails to switch
    /// off; the state is idle regardless.
    #[tracing::instrument(skip(self))]
    pub async fn stop_program(&self) -> Result<(), IrrigoError> {
        let mut inner = self.inner.lock().await;
        let settings = self.settings.get().await?;
        self.stop_all_locked(&mut inner, &settings, time::now()).await
    }

    // -- manual zones --------------------------------------------------------

    /// Switch one zone on for `minutes`.
    ///
    /// # Errors
    ///
    /// - [`ConflictError::ProgramRunning`] while a program runs
    /// - [`IrrigoError::NotFound`] for an unknown zone
    /// - [`ValidationError::ZeroDuration`] / [`ValidationError::DurationExceedsMax`]
    /// - [`ConflictError::ZoneAlreadyActive`] / [`ConflictError::TooManyActiveZones`]
    /// - [`IrrigoError::HardwareFault`] when the relay does not respond
    #[tracing::instrument(skip(self), fields(zone_id = %zone_id))]
    pub async fn start_zone(&self, zone_id: ZoneId, minutes: u32) -> Result<(), IrrigoError> {
        let mut inner = self.inner.lock().await;
        if inner.state.running() {
            return Err(ConflictError::ProgramRunning.into());
        }
        let settings = self.settings.get().await?;
        let zone = zone::find(&settings.zones, zone_id).ok_or_else(|| NotFoundError {
            entity: "Zone",
            id: zone_id.to_string(),
        })?;
        if minutes == 0 {
            return Err(ValidationError::ZeroDuration.into());
        }
        let request = ActivationRequest {
            zone_id,
            duration_minutes: minutes,
        };
        safety::can_activate(request, &inner.state, &settings.safety).into_result()?;

        let now = time::now();
        let seconds = minutes.saturating_mul(60);
        if let Err(err) = self.energize(&mut inner, zone, seconds, &settings).await {
            self.release_relay_if_idle(&mut inner, &settings).await;
            return Err(self.record_fault(&mut inner, err, Some(zone_id), now).await);
        }

        inner.state.fault = None;
        inner
            .state
            .manual
            .insert(zone_id, ZoneRun::new(zone, seconds, now));
        tracing::info!(zone_id = %zone_id, minutes, "zone started");
        self.emit(
            Event::new(
                EventType::ZoneStarted,
                format!("{} started for {minutes} min", zone.name),
            )
            .with_zone(zone_id),
        )
        .await;
        self.commit(&inner).await;
        Ok(())
    }

    /// Switch a manual zone off. Stopping an idle zone succeeds.
    ///
    /// # Errors
    ///
    /// - [`ConflictError::ProgramRunning`] when the zone belongs to the running program
    /// - [`IrrigoError::HardwareFault`] when the relay does not respond
    #[tracing::instrument(skip(self), fields(zone_id = %zone_id))]
    pub async fn stop_zone(&self, zone_id: ZoneId) -> Result<(), IrrigoError> {
        let mut inner = self.inner.lock().await;
        if inner
            .state
            .active_zone()
            .is_some_and(|run| run.zone_id == zone_id)
        {
            return Err(ConflictError::ProgramRunning.into());
        }
        if !inner.state.manual.contains_key(&zone_id) {
            return Ok(());
        }
        let settings = self.settings.get().await?;
        let Some(run) = inner.state.manual.remove(&zone_id) else {
            return Ok(());
        };
        let now = time::now();
        let released = self.release(zone_id, &settings).await;
        self.release_relay_if_idle(&mut inner, &settings).await;
        if let Err(err) = released {
            return Err(self.record_fault(&mut inner, err, Some(zone_id), now).await);
        }
        tracing::info!(zone_id = %zone_id, "zone stopped");
        self.emit(Event::new(EventType::ZoneStopped, format!("{} stopped", run.name)).with_zone(zone_id))
            .await;
        self.commit(&inner).await;
        Ok(())
    }

    // -- clock ---------------------------------------------------------------

    /// Advance countdowns to `now`, apply step transitions and completions,
    /// then start a due automatic program.
    ///
    /// A tick that arrives while another one is still running is skipped.
    ///
    /// # Errors
    ///
    /// Returns a storage error when settings or programs cannot be read.
    pub async fn tick(&self, now: Timestamp) -> Result<(), IrrigoError> {
        if self.ticking.swap(true, Ordering::AcqRel) {
            tracing::debug!("previous tick still running, skipping");
            return Ok(());
        }
        let _guard = TickGuard(&self.ticking);

        let mut inner = self.inner.lock().await;
        let elapsed = inner.elapsed(now);
        let settings = self.settings.get().await?;
        if elapsed > 0 && !inner.state.is_idle() {
            self.advance_locked(&mut inner, elapsed, &settings, now)
                .await;
        }
        if settings.automatic_programs_enabled {
            self.trigger_due_locked(&mut inner, &settings, now).await?;
        }
        Ok(())
    }

    /// Reset to a safe idle state after a restart.
    ///
    /// When the persisted state shows something was running, every
    /// configured zone and the master relay are switched off and a
    /// `state_recovered` event names what was interrupted.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the persisted state or settings cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<(), IrrigoError> {
        let mut inner = self.inner.lock().await;
        let settings = self.settings.get().await?;
        let persisted = self.state_store.load().await?.unwrap_or_default();

        if !persisted.is_idle() {
            let interrupted = persisted.program.as_ref();
            tracing::warn!(
                program_id = ?interrupted.map(|run| &run.program_id),
                manual_zones = persisted.manual.len(),
                "execution interrupted by restart, switching everything off"
            );
            for zone in &settings.zones {
                let status = tokio::time::timeout(self.config.driver_timeout, self.driver.status(zone.id))
                    .await
                    .ok();
                if status == Some(ZoneStatus::Active) {
                    tracing::debug!(zone_id = %zone.id, "zone still energized");
                }
                if let Err(err) = self.drive(self.driver.deactivate(zone)).await {
                    tracing::error!(zone_id = %zone.id, error = %err, "failed to switch zone off");
                }
            }
            let pin = settings.safety.safety_relay.pin;
            if let Err(err) = self.drive(self.driver.set_safety_relay(pin, false)).await {
                tracing::error!(pin, error = %err, "failed to release safety relay");
            }

            let event = match interrupted {
                Some(run) => Event::new(
                    EventType::StateRecovered,
                    format!(
                        "Program {} interrupted by restart, all zones switched off",
                        run.program_name
                    ),
                )
                .with_program(run.program_id.clone()),
                None => Event::new(
                    EventType::StateRecovered,
                    "Manual zones interrupted by restart, all zones switched off",
                ),
            };
            self.emit(event).await;
        }

        *inner = Inner::default();
        self.commit(&inner).await;
        Ok(())
    }

    // -- program store -------------------------------------------------------

    /// Save a new program or replace one by id.
    ///
    /// Replacing the running program stops it.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::Validation`] when the program is rejected by the store.
    pub async fn save_program(&self, program: Program) -> Result<Program, IrrigoError> {
        let mut inner = self.inner.lock().await;
        let settings = self.settings.get().await?;
        let saved = self.programs.save(program, &settings.zones).await?;
        self.after_program_write(&mut inner, &settings, &saved).await?;
        Ok(saved)
    }

    /// Replace an existing program.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] when the id is unknown and
    /// [`IrrigoError::Validation`] when the program is rejected.
    pub async fn update_program(&self, program: Program) -> Result<Program, IrrigoError> {
        let mut inner = self.inner.lock().await;
        let settings = self.settings.get().await?;
        let saved = self.programs.update(program, &settings.zones).await?;
        self.after_program_write(&mut inner, &settings, &saved).await?;
        Ok(saved)
    }

    /// Delete a program, stopping it first when it is running.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] for an unknown id.
    #[tracing::instrument(skip(self), fields(program_id = %id))]
    pub async fn delete_program(&self, id: &ProgramId) -> Result<(), IrrigoError> {
        let mut inner = self.inner.lock().await;
        let settings = self.settings.get().await?;
        self.programs.delete(id).await?;
        if inner.state.current_program_id() == Some(id) {
            self.stop_all_locked(&mut inner, &settings, time::now()).await?;
        }
        inner.fired.remove(id);
        self.emit(Event::new(EventType::ProgramDeleted, format!("Program {id} deleted")).with_program(id.clone()))
            .await;
        Ok(())
    }

    /// Switch automatic scheduling of one program.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] for an unknown id.
    pub async fn set_program_automatic(
        &self,
        id: &ProgramId,
        enabled: bool,
    ) -> Result<Program, IrrigoError> {
        let _inner = self.inner.lock().await;
        let program = self.programs.set_automatic(id, enabled).await?;
        let state = if enabled { "enabled" } else { "disabled" };
        self.emit(
            Event::new(
                EventType::ProgramSaved,
                format!("Automatic run of {} {state}", program.name),
            )
            .with_program(id.clone()),
        )
        .await;
        Ok(program)
    }

    // -- settings ------------------------------------------------------------

    /// Switch automatic programs on or off globally.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the settings repository.
    pub async fn set_automatic_programs(&self, enabled: bool) -> Result<UserSettings, IrrigoError> {
        let _inner = self.inner.lock().await;
        let settings = self.settings.set_automatic_programs(enabled).await?;
        let state = if enabled { "enabled" } else { "disabled" };
        tracing::info!(enabled, "automatic programs toggled");
        self.emit(Event::new(
            EventType::SettingsChanged,
            format!("Automatic programs {state}"),
        ))
        .await;
        Ok(settings)
    }

    /// Replace the user settings. Anything running is stopped first using
    /// the previous zone layout.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::Validation`] when the settings are rejected.
    #[tracing::instrument(skip(self, settings))]
    pub async fn save_settings(&self, settings: UserSettings) -> Result<UserSettings, IrrigoError> {
        let mut inner = self.inner.lock().await;
        let previous = self.settings.get().await?;
        settings.validate()?;
        self.stop_all_locked(&mut inner, &previous, time::now()).await?;
        let saved = self.settings.save(settings).await?;
        self.emit(Event::new(EventType::SettingsChanged, "Settings saved"))
            .await;
        Ok(saved)
    }

    /// Restore default settings.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the settings repository.
    pub async fn reset_settings(&self) -> Result<UserSettings, IrrigoError> {
        let mut inner = self.inner.lock().await;
        let previous = self.settings.get().await?;
        self.stop_all_locked(&mut inner, &previous, time::now()).await?;
        let saved = self.settings.reset().await?;
        self.emit(Event::new(EventType::SettingsChanged, "Settings reset to defaults"))
            .await;
        Ok(saved)
    }

    /// Stop everything, delete every program and restore default settings.
    ///
    /// # Errors
    ///
    /// Returns a storage error from either repository.
    #[tracing::instrument(skip(self))]
    pub async fn reset_factory_data(&self) -> Result<(), IrrigoError> {
        let mut inner = self.inner.lock().await;
        let previous = self.settings.get().await?;
        self.stop_all_locked(&mut inner, &previous, time::now()).await?;
        self.programs.delete_all().await?;
        self.settings.reset().await?;
        inner.fired.clear();
        tracing::warn!("factory data reset");
        self.emit(Event::new(EventType::SettingsChanged, "Factory data reset"))
            .await;
        Ok(())
    }

    // -- internals -----------------------------------------------------------

    async fn start_program_locked(
        &self,
        inner: &mut Inner,
        id: &ProgramId,
        trigger: Trigger,
        settings: &UserSettings,
        now: Timestamp,
    ) -> Result<(), IrrigoError> {
        if let Some(run) = &inner.state.program {
            return Err(ConflictError::AlreadyRunning(run.program_id.clone()).into());
        }
        if !inner.state.manual.is_empty() {
            return Err(ConflictError::ZonesActive.into());
        }
        let program = self.programs.get(id).await?;

        let max = settings.safety.max_zone_duration_minutes;
        for step in &program.steps {
            if zone::find(&settings.zones, step.zone_id).is_none() {
                return Err(ValidationError::UnknownZone(step.zone_id).into());
            }
            if step.duration_minutes > max {
                return Err(ValidationError::DurationExceedsMax {
                    minutes: step.duration_minutes,
                    max,
                }
                .into());
            }
        }
        let mut queue = program.steps.clone();
        if queue.is_empty() {
            return Err(ValidationError::NoSteps.into());
        }
        let first = queue.remove(0);
        let zone = zone::find(&settings.zones, first.zone_id)
            .ok_or(ValidationError::UnknownZone(first.zone_id))?;
        let request = ActivationRequest {
            zone_id: first.zone_id,
            duration_minutes: first.duration_minutes,
        };
        safety::can_activate(request, &inner.state, &settings.safety).into_result()?;

        let seconds = first.duration_seconds();
        if let Err(err) = self.energize(inner, zone, seconds, settings).await {
            self.release_relay_if_idle(inner, settings).await;
            return Err(self.record_fault(inner, err, Some(zone.id), now).await);
        }

        inner.state.fault = None;
        inner.state.program = Some(ProgramRun {
            program_id: program.id.clone(),
            program_name: program.name.clone(),
            trigger,
            started_at: now,
            phase: Phase::Watering(ZoneRun::new(zone, seconds, now)),
            queue,
        });
        tracing::info!(program_id = %program.id, trigger = trigger.as_str(), "program started");
        self.emit(
            Event::new(
                EventType::ProgramStarted,
                format!("Program {} started ({})", program.name, trigger.as_str()),
            )
            .with_program(program.id.clone()),
        )
        .await;
        self.emit(
            Event::new(
                EventType::ZoneStarted,
                format!("{} started for {} min", zone.name, first.duration_minutes),
            )
            .with_zone(zone.id)
            .with_program(program.id),
        )
        .await;
        self.commit(inner).await;
        Ok(())
    }

    async fn stop_all_locked(
        &self,
        inner: &mut Inner,
        settings: &UserSettings,
        now: Timestamp,
    ) -> Result<(), IrrigoError> {
        if inner.state.is_idle() {
            self.release_relay_if_idle(inner, settings).await;
            return Ok(());
        }
        let zone_ids = inner.state.active_zone_ids();
        let stopped = inner.state.program.take();
        inner.state.manual.clear();

        let mut failure = None;
        for zone_id in zone_ids {
            match self.release(zone_id, settings).await {
                Ok(()) => {
                    self.emit(Event::new(EventType::ZoneStopped, format!("Zone {zone_id} stopped")).with_zone(zone_id))
                        .await;
                }
                Err(err) => {
                    failure.get_or_insert((err, zone_id));
                }
            }
        }
        self.release_relay_if_idle(inner, settings).await;

        if let Some(run) = stopped {
            tracing::info!(program_id = %run.program_id, "program stopped");
            self.emit(
                Event::new(
                    EventType::ProgramStopped,
                    format!("Program {} stopped", run.program_name),
                )
                .with_program(run.program_id),
            )
            .await;
        }
        if let Some((err, zone_id)) = failure {
            return Err(self.record_fault(inner, err, Some(zone_id), now).await);
        }
        self.commit(inner).await;
        Ok(())
    }

    async fn advance_locked(
        &self,
        inner: &mut Inner,
        elapsed: u32,
        settings: &UserSettings,
        now: Timestamp,
    ) {
        let state = std::mem::take(&mut inner.state);
        let (next, effects) = state.advance(
            elapsed,
            now,
            &settings.zones,
            settings.safety.activation_delay_seconds,
        );
        inner.state = next;
        if effects.is_empty() {
            self.snapshot.send_replace(inner.state.clone());
            return;
        }

        // every expired zone is switched off even after a failure; only the first fault is kept
        let mut failure: Option<(DriverError, ZoneId)> = None;
        let mut activation_failed = false;
        for effect in effects {
            match effect {
                Effect::Deactivate(zone_id) => {
                    if let Err(err) = self.release(zone_id, settings).await {
                        tracing::error!(zone_id = %zone_id, error = %err, "failed to switch zone off");
                        failure.get_or_insert((err, zone_id));
                        continue;
                    }
                    tracing::info!(zone_id = %zone_id, "zone finished");
                    self.emit(Event::new(EventType::ZoneStopped, format!("Zone {zone_id} finished")).with_zone(zone_id))
                        .await;
                }
                Effect::Activate { zone_id, seconds } => {
                    if failure.is_some() {
                        activation_failed = true;
                        continue;
                    }
                    let result = match zone::find(&settings.zones, zone_id) {
                        Some(zone) => self.energize(inner, zone, seconds, settings).await,
                        None => Err(DriverError::HardwareFault {
                            zone_id,
                            reason: "zone is no longer configured".to_string(),
                        }),
                    };
                    if let Err(err) = result {
                        failure = Some((err, zone_id));
                        activation_failed = true;
                        continue;
                    }
                    tracing::info!(zone_id = %zone_id, seconds, "next step started");
                    let mut event = Event::new(
                        EventType::ZoneStarted,
                        format!("Zone {zone_id} started for {} min", seconds / 60),
                    )
                    .with_zone(zone_id);
                    if let Some(program_id) = inner.state.current_program_id() {
                        event = event.with_program(program_id.clone());
                    }
                    self.emit(event).await;
                }
                Effect::Completed {
                    program_id,
                    program_name,
                    trigger,
                } => {
                    if activation_failed {
                        continue;
                    }
                    let today = self.config.wall_clock.today(now);
                    if let Err(err) = self.programs.mark_run(&program_id, today).await {
                        tracing::warn!(program_id = %program_id, error = %err, "could not record last run date");
                    }
                    tracing::info!(program_id = %program_id, trigger = trigger.as_str(), "program completed");
                    self.emit(
                        Event::new(
                            EventType::ProgramCompleted,
                            format!("Program {program_name} completed"),
                        )
                        .with_program(program_id),
                    )
                    .await;
                }
            }
        }
        if let Some((err, zone_id)) = failure {
            self.abort_program(inner, settings, err, zone_id, now).await;
        }
        self.release_relay_if_idle(inner, settings).await;
        self.commit(inner).await;
    }

    async fn trigger_due_locked(
        &self,
        inner: &mut Inner,
        settings: &UserSettings,
        now: Timestamp,
    ) -> Result<(), IrrigoError> {
        let local = self.config.wall_clock.local(now);
        let today = local.date();
        inner.fired.retain(|_, day| *day == today);

        let programs = self.programs.list().await?;
        let due: Vec<&Program> = schedule::due_programs(programs.values(), local)
            .into_iter()
            .filter(|p| !inner.fired.contains_key(&p.id))
            .collect();
        let Some((first, rest)) = due.split_first() else {
            return Ok(());
        };
        for program in &due {
            inner.fired.insert(program.id.clone(), today);
        }

        if !inner.state.is_idle() {
            for program in &due {
                tracing::warn!(program_id = %program.id, "engine busy at activation time, skipping");
            }
            return Ok(());
        }
        for program in rest {
            tracing::warn!(
                program_id = %program.id,
                started = %first.id,
                "another program is due at the same time, skipping"
            );
        }
        if let Err(err) = self
            .start_program_locked(inner, &first.id, Trigger::Automatic, settings, now)
            .await
        {
            tracing::error!(program_id = %first.id, error = %err, "automatic start failed");
        }
        Ok(())
    }

    async fn after_program_write(
        &self,
        inner: &mut Inner,
        settings: &UserSettings,
        saved: &Program,
    ) -> Result<(), IrrigoError> {
        if inner.state.current_program_id() == Some(&saved.id) {
            tracing::info!(program_id = %saved.id, "running program replaced, stopping it");
            self.stop_all_locked(inner, settings, time::now()).await?;
        }
        self.emit(
            Event::new(EventType::ProgramSaved, format!("Program {} saved", saved.name))
                .with_program(saved.id.clone()),
        )
        .await;
        Ok(())
    }

    async fn abort_program(
        &self,
        inner: &mut Inner,
        settings: &UserSettings,
        err: DriverError,
        zone_id: ZoneId,
        now: Timestamp,
    ) {
        if let Some(run) = inner.state.program.take() {
            if let Phase::Watering(zone_run) = &run.phase {
                if zone_run.zone_id != zone_id {
                    if let Err(err) = self.release(zone_run.zone_id, settings).await {
                        tracing::error!(zone_id = %zone_run.zone_id, error = %err, "failed to switch zone off");
                    }
                }
            }
            tracing::error!(program_id = %run.program_id, "program aborted");
        }
        self.release_relay_if_idle(inner, settings).await;
        self.record_fault(inner, err, Some(zone_id), now).await;
    }

    /// Master relay on if needed, then the zone relay.
    async fn energize(
        &self,
        inner: &mut Inner,
        zone: &Zone,
        seconds: u32,
        settings: &UserSettings,
    ) -> Result<(), DriverError> {
        if !inner.relay_on {
            let pin = settings.safety.safety_relay.pin;
            self.drive(self.driver.set_safety_relay(pin, true)).await?;
            inner.relay_on = true;
        }
        let result = self
            .drive(self.driver.activate(zone, Duration::from_secs(u64::from(seconds))))
            .await;
        if result.is_err() {
            // the relay may be half-way; make sure it ends up off
            if let Err(err) = self.drive(self.driver.deactivate(zone)).await {
                tracing::error!(zone_id = %zone.id, error = %err, "failed to switch zone off after a failed start");
            }
        }
        result
    }

    async fn release(&self, zone_id: ZoneId, settings: &UserSettings) -> Result<(), DriverError> {
        match zone::find(&settings.zones, zone_id) {
            Some(zone) => self.drive(self.driver.deactivate(zone)).await,
            None => {
                tracing::warn!(zone_id = %zone_id, "zone missing from settings, cannot switch it off");
                Ok(())
            }
        }
    }

    async fn release_relay_if_idle(&self, inner: &mut Inner, settings: &UserSettings) {
        if !inner.relay_on || inner.state.active_count() > 0 {
            return;
        }
        let pin = settings.safety.safety_relay.pin;
        match self.drive(self.driver.set_safety_relay(pin, false)).await {
            Ok(()) => inner.relay_on = false,
            Err(err) => {
                tracing::error!(pin, error = %err, "failed to release safety relay");
                self.emit(Event::new(EventType::HardwareFault, err.to_string()))
                    .await;
            }
        }
    }

    async fn drive<F>(&self, call: F) -> Result<(), DriverError>
    where
        F: Future<Output = Result<(), DriverError>>,
    {
        let millis = u64::try_from(self.config.driver_timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(self.config.driver_timeout, call)
            .await
            .unwrap_or(Err(DriverError::Timeout { millis }))
    }

    async fn record_fault(
        &self,
        inner: &mut Inner,
        err: DriverError,
        zone_id: Option<ZoneId>,
        now: Timestamp,
    ) -> IrrigoError {
        tracing::error!(zone_id = ?zone_id, error = %err, "hardware fault");
        inner.state.fault = Some(Fault {
            message: err.to_string(),
            zone_id,
            at: now,
        });
        let mut event = Event::new(EventType::HardwareFault, err.to_string());
        if let Some(zone_id) = zone_id {
            event = event.with_zone(zone_id);
        }
        self.emit(event).await;
        self.commit(inner).await;
        IrrigoError::HardwareFault(err)
    }

    async fn emit(&self, event: Event) {
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(error = %err, "failed to publish event");
        }
    }

    /// Persist and publish the current state.
    async fn commit(&self, inner: &Inner) {
        if let Err(err) = self.state_store.save(inner.state.clone()).await {
            tracing::error!(error = %err, "failed to persist execution state");
        }
        self.snapshot.send_replace(inner.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{FixedOffset, TimeZone, Utc};
    use irrigo_domain::program::ProgramStep;

    use crate::testing::{
        DriverCall, InMemoryProgramRepo, InMemorySettingsRepo, InMemoryStateStore,
        RecordingPublisher, SpyDriver,
    };

    type TestEngine = Engine<
        Arc<SpyDriver>,
        InMemoryProgramRepo,
        InMemorySettingsRepo,
        InMemoryStateStore,
        Arc<RecordingPublisher>,
    >;

    struct Harness {
        engine: TestEngine,
        driver: Arc<SpyDriver>,
        events: Arc<RecordingPublisher>,
        settings_down: Arc<AtomicBool>,
    }

    fn harness_with(
        settings: UserSettings,
        programs: Vec<Program>,
        persisted: Option<ExecutionState>,
    ) -> Harness {
        let driver = Arc::new(SpyDriver::default());
        let events = Arc::new(RecordingPublisher::default());
        let settings_repo = InMemorySettingsRepo::with(settings);
        let settings_down = settings_repo.outage();
        let engine = Engine::new(
            Arc::clone(&driver),
            ProgramService::new(InMemoryProgramRepo::with(programs)),
            SettingsService::new(settings_repo),
            InMemoryStateStore {
                state: std::sync::Mutex::new(persisted),
            },
            Arc::clone(&events),
            EngineConfig {
                driver_timeout: Duration::from_secs(2),
                wall_clock: WallClock::Fixed(FixedOffset::east_opt(0).unwrap()),
            },
        );
        Harness {
            engine,
            driver,
            events,
            settings_down,
        }
    }

    fn harness(programs: Vec<Program>) -> Harness {
        harness_with(UserSettings::default(), programs, None)
    }

    fn program(id: &str, time: &str, steps: &[(u32, u32)]) -> Program {
        Program::builder()
            .id(id)
            .name(format!("P{id}"))
            .activation_time(time)
            .months(1..=12)
            .steps(steps.iter().map(|(z, m)| ProgramStep::new(*z, *m)))
            .build()
            .unwrap()
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap()
    }

    fn at(seconds: i64) -> Timestamp {
        t0() + chrono::Duration::seconds(seconds)
    }

    fn id(raw: &str) -> ProgramId {
        ProgramId::new(raw)
    }

    #[tokio::test]
    async fn should_energize_safety_relay_before_first_zone() {
        let h = harness(vec![program("1", "06:00", &[(0, 1), (1, 1)])]);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();

        assert_eq!(
            h.driver.calls(),
            vec![DriverCall::Relay(true), DriverCall::Activate(ZoneId(0))]
        );
        let state = h.engine.state();
        assert!(state.running());
        assert_eq!(state.trigger(), Some(Trigger::Manual));
        assert_eq!(state.active_zone().unwrap().zone_id, ZoneId(0));
        assert_eq!(state.queue(), vec![ProgramStep::new(1, 1)]);
        assert_eq!(
            h.events.types(),
            vec![EventType::ProgramStarted, EventType::ZoneStarted]
        );
    }

    #[tokio::test]
    async fn should_return_conflict_when_program_already_running() {
        let h = harness(vec![
            program("1", "06:00", &[(0, 1)]),
            program("2", "07:00", &[(1, 1)]),
        ]);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();
        let before = h.engine.state();

        let result = h.engine.start_program(&id("2"), Trigger::Manual).await;
        assert!(matches!(
            result,
            Err(IrrigoError::Conflict(ConflictError::AlreadyRunning(running))) if running == id("1")
        ));
        assert_eq!(h.engine.state(), before);
        assert_eq!(h.driver.activations(), vec![ZoneId(0)]);
    }

    #[tokio::test]
    async fn should_return_conflict_when_manual_zones_active() {
        let h = harness(vec![program("1", "06:00", &[(0, 1)])]);
        h.engine.start_zone(ZoneId(3), 5).await.unwrap();
        let result = h.engine.start_program(&id("1"), Trigger::Manual).await;
        assert!(matches!(
            result,
            Err(IrrigoError::Conflict(ConflictError::ZonesActive))
        ));
    }

    #[tokio::test]
    async fn should_return_not_found_when_program_unknown() {
        let h = harness(vec![]);
        let result = h.engine.start_program(&id("7"), Trigger::Manual).await;
        assert!(matches!(result, Err(IrrigoError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_refuse_program_with_step_above_max_duration() {
        let mut settings = UserSettings::default();
        settings.safety.max_zone_duration_minutes = 30;
        let h = harness_with(settings, vec![program("1", "06:00", &[(0, 10), (1, 45)])], None);

        let result = h.engine.start_program(&id("1"), Trigger::Manual).await;
        assert!(matches!(
            result,
            Err(IrrigoError::Validation(ValidationError::DurationExceedsMax {
                minutes: 45,
                max: 30
            }))
        ));
        assert!(h.driver.calls().is_empty());
    }

    #[tokio::test]
    async fn should_run_two_steps_with_delay_and_release_everything_at_the_end() {
        let mut settings = UserSettings::default();
        settings.safety.activation_delay_seconds = 5;
        let h = harness_with(settings, vec![program("1", "05:00", &[(0, 1), (1, 1)])], None);

        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();
        h.engine.tick(at(0)).await.unwrap();

        for second in 1..=130 {
            h.engine.tick(at(second)).await.unwrap();
            let state = h.engine.state();
            assert_eq!(
                h.driver.energized(),
                usize::from(state.active_zone().is_some()),
                "second {second}"
            );
            match second {
                1..=59 => assert_eq!(state.active_zone().unwrap().zone_id, ZoneId(0)),
                60..=64 => {
                    assert!(state.running());
                    assert_eq!(state.active_count(), 0);
                }
                65..=124 => assert_eq!(state.active_zone().unwrap().zone_id, ZoneId(1)),
                _ => assert!(state.is_idle()),
            }
        }

        assert_eq!(
            h.driver.calls(),
            vec![
                DriverCall::Relay(true),
                DriverCall::Activate(ZoneId(0)),
                DriverCall::Deactivate(ZoneId(0)),
                DriverCall::Relay(false),
                DriverCall::Relay(true),
                DriverCall::Activate(ZoneId(1)),
                DriverCall::Deactivate(ZoneId(1)),
                DriverCall::Relay(false),
            ]
        );
        let program = h.engine.program(&id("1")).await.unwrap();
        assert_eq!(program.last_run_date, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(
            h.events.types().last(),
            Some(&EventType::ProgramCompleted)
        );
    }

    #[tokio::test]
    async fn should_reach_idle_after_total_program_duration() {
        let h = harness(vec![program("1", "05:00", &[(0, 2), (1, 3), (2, 1)])]);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();
        h.engine.tick(at(0)).await.unwrap();

        let mut second = 0;
        let mut last_remaining = u32::MAX;
        let mut last_zone = ZoneId(0);
        while h.engine.state().running() {
            second += 7;
            h.engine.tick(at(second)).await.unwrap();
            if let Some(zone_run) = h.engine.state().active_zone().cloned() {
                if zone_run.zone_id == last_zone {
                    assert!(zone_run.remaining_seconds <= last_remaining);
                }
                last_zone = zone_run.zone_id;
                last_remaining = zone_run.remaining_seconds;
            }
            assert!(second < 600, "program never finished");
        }
        assert!((360..360 + 7).contains(&second));
    }

    #[tokio::test]
    async fn should_leave_zero_active_zones_when_stopped_during_delay() {
        let mut settings = UserSettings::default();
        settings.safety.activation_delay_seconds = 30;
        let h = harness_with(settings, vec![program("1", "05:00", &[(0, 1), (1, 1)])], None);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();
        h.engine.tick(at(0)).await.unwrap();
        h.engine.tick(at(60)).await.unwrap();
        assert_eq!(h.engine.state().delay_remaining(), Some(30));

        h.engine.stop_program().await.unwrap();

        let state = h.engine.state();
        assert!(state.is_idle());
        assert_eq!(h.driver.energized(), 0);
        h.engine.tick(at(120)).await.unwrap();
        assert_eq!(h.driver.activations(), vec![ZoneId(0)]);
        assert!(h.events.types().contains(&EventType::ProgramStopped));
    }

    #[tokio::test]
    async fn should_stop_manual_zones_with_stop_program() {
        let h = harness(vec![]);
        h.engine.start_zone(ZoneId(0), 5).await.unwrap();
        h.engine.start_zone(ZoneId(1), 5).await.unwrap();
        h.engine.stop_program().await.unwrap();
        assert!(h.engine.state().is_idle());
        assert_eq!(h.driver.energized(), 0);
        assert_eq!(h.driver.calls().last(), Some(&DriverCall::Relay(false)));
    }

    #[tokio::test]
    async fn should_succeed_when_stopping_idle_engine() {
        let h = harness(vec![]);
        assert!(h.engine.stop_program().await.is_ok());
        assert!(h.driver.calls().is_empty());
    }

    #[tokio::test]
    async fn should_reject_manual_duration_above_max_without_actuation() {
        let h = harness(vec![]);
        let result = h.engine.start_zone(ZoneId(5), 200).await;
        assert!(matches!(
            result,
            Err(IrrigoError::Validation(ValidationError::DurationExceedsMax {
                minutes: 200,
                max: 180
            }))
        ));
        assert!(h.driver.calls().is_empty());
    }

    #[tokio::test]
    async fn should_reject_zero_minute_manual_run() {
        let h = harness(vec![]);
        assert!(matches!(
            h.engine.start_zone(ZoneId(0), 0).await,
            Err(IrrigoError::Validation(ValidationError::ZeroDuration))
        ));
    }

    #[tokio::test]
    async fn should_return_not_found_for_unknown_zone() {
        let h = harness(vec![]);
        assert!(matches!(
            h.engine.start_zone(ZoneId(42), 5).await,
            Err(IrrigoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn should_never_exceed_max_active_zones() {
        let h = harness(vec![]);
        for zone in 0..3 {
            h.engine.start_zone(ZoneId(zone), 5).await.unwrap();
        }
        let result = h.engine.start_zone(ZoneId(3), 5).await;
        assert!(matches!(
            result,
            Err(IrrigoError::Conflict(ConflictError::TooManyActiveZones { max: 3 }))
        ));
        assert_eq!(h.driver.energized(), 3);
        assert_eq!(h.engine.state().active_count(), 3);
    }

    #[tokio::test]
    async fn should_lock_manual_control_while_program_runs() {
        let h = harness(vec![program("1", "05:00", &[(0, 1)])]);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();

        assert!(matches!(
            h.engine.start_zone(ZoneId(4), 5).await,
            Err(IrrigoError::Conflict(ConflictError::ProgramRunning))
        ));
        assert!(matches!(
            h.engine.stop_zone(ZoneId(0)).await,
            Err(IrrigoError::Conflict(ConflictError::ProgramRunning))
        ));
        assert!(h.engine.stop_zone(ZoneId(4)).await.is_ok());
    }

    #[tokio::test]
    async fn should_expire_manual_zone_on_tick() {
        let h = harness(vec![]);
        h.engine.start_zone(ZoneId(2), 1).await.unwrap();
        h.engine.tick(at(0)).await.unwrap();
        h.engine.tick(at(30)).await.unwrap();
        assert_eq!(
            h.engine.state().zone_run(ZoneId(2)).unwrap().remaining_seconds,
            30
        );
        h.engine.tick(at(60)).await.unwrap();
        assert!(h.engine.state().is_idle());
        assert_eq!(h.driver.energized(), 0);
    }

    #[tokio::test]
    async fn should_clamp_long_gaps_between_ticks() {
        let h = harness(vec![]);
        h.engine.start_zone(ZoneId(0), 30).await.unwrap();
        h.engine.tick(at(0)).await.unwrap();
        h.engine.tick(at(600)).await.unwrap();
        assert_eq!(
            h.engine.state().zone_run(ZoneId(0)).unwrap().remaining_seconds,
            1800 - 60
        );
    }

    #[tokio::test]
    async fn should_roll_back_and_record_fault_when_relay_fails() {
        let h = harness(vec![program("1", "05:00", &[(0, 1)])]);
        h.driver.fail_on(ZoneId(0));

        let result = h.engine.start_program(&id("1"), Trigger::Manual).await;
        assert!(matches!(result, Err(IrrigoError::HardwareFault(_))));

        let state = h.engine.state();
        assert!(state.is_idle());
        assert_eq!(state.fault.as_ref().and_then(|f| f.zone_id), Some(ZoneId(0)));
        assert_eq!(
            h.driver.calls(),
            vec![
                DriverCall::Relay(true),
                DriverCall::Activate(ZoneId(0)),
                DriverCall::Deactivate(ZoneId(0)),
                DriverCall::Relay(false),
            ]
        );
        assert!(h.events.types().contains(&EventType::HardwareFault));

        h.engine.start_zone(ZoneId(1), 5).await.unwrap();
        assert!(h.engine.state().fault.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_timeout_when_driver_hangs() {
        let h = harness(vec![]);
        h.driver.hang();
        let result = h.engine.start_zone(ZoneId(0), 5).await;
        assert!(matches!(
            result,
            Err(IrrigoError::HardwareFault(DriverError::Timeout { millis: 2000 }))
        ));
        assert!(h.engine.state().manual.is_empty());
    }

    #[tokio::test]
    async fn should_abort_program_when_next_step_fails() {
        let h = harness(vec![program("1", "05:00", &[(0, 1), (1, 1)])]);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();
        h.driver.fail_on(ZoneId(1));

        h.engine.tick(at(0)).await.unwrap();
        h.engine.tick(at(60)).await.unwrap();

        let state = h.engine.state();
        assert!(!state.running());
        assert!(state.is_idle());
        assert_eq!(state.fault.as_ref().and_then(|f| f.zone_id), Some(ZoneId(1)));
        assert_eq!(h.driver.energized(), 0);
        assert_eq!(h.driver.calls().last(), Some(&DriverCall::Relay(false)));
        let types = h.events.types();
        assert!(types.contains(&EventType::HardwareFault));
        assert!(!types.contains(&EventType::ProgramCompleted));
        assert_eq!(h.engine.program(&id("1")).await.unwrap().last_run_date, None);
    }

    #[tokio::test]
    async fn should_switch_every_expired_zone_off_when_one_fails() {
        let h = harness(vec![]);
        h.engine.start_zone(ZoneId(0), 1).await.unwrap();
        h.engine.start_zone(ZoneId(1), 1).await.unwrap();
        h.driver.fail_off(ZoneId(0));

        h.engine.tick(at(0)).await.unwrap();
        h.engine.tick(at(60)).await.unwrap();

        let calls = h.driver.calls();
        assert!(calls.contains(&DriverCall::Deactivate(ZoneId(0))));
        assert!(calls.contains(&DriverCall::Deactivate(ZoneId(1))));
        assert_eq!(calls.last(), Some(&DriverCall::Relay(false)));
        let state = h.engine.state();
        assert!(state.is_idle());
        assert_eq!(state.fault.as_ref().and_then(|f| f.zone_id), Some(ZoneId(0)));
        assert_eq!(
            h.events
                .types()
                .iter()
                .filter(|t| **t == EventType::ZoneStopped)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn should_keep_tracking_zone_when_stop_cannot_read_settings() {
        let h = harness(vec![]);
        h.engine.start_zone(ZoneId(0), 5).await.unwrap();

        h.settings_down.store(true, Ordering::SeqCst);
        let result = h.engine.stop_zone(ZoneId(0)).await;
        assert!(matches!(result, Err(IrrigoError::Storage(_))));
        h.settings_down.store(false, Ordering::SeqCst);

        h.engine.tick(at(0)).await.unwrap();
        for minute in 1..=5 {
            h.engine.tick(at(minute * 60)).await.unwrap();
        }
        assert!(h.engine.state().is_idle());
        assert_eq!(h.driver.energized(), 0);
        assert_eq!(h.driver.calls().last(), Some(&DriverCall::Relay(false)));
    }

    #[tokio::test]
    async fn should_start_due_program_automatically() {
        let mut settings = UserSettings::default();
        settings.automatic_programs_enabled = true;
        let h = harness_with(settings, vec![program("1", "06:00", &[(0, 1)])], None);

        h.engine.tick(at(0)).await.unwrap();
        let state = h.engine.state();
        assert_eq!(state.trigger(), Some(Trigger::Automatic));
        assert_eq!(state.current_program_id(), Some(&id("1")));

        h.engine.stop_program().await.unwrap();
        h.engine.tick(at(20)).await.unwrap();
        assert!(h.engine.state().is_idle());
    }

    #[tokio::test]
    async fn should_not_trigger_when_global_switch_off() {
        let h = harness(vec![program("1", "06:00", &[(0, 1)])]);
        h.engine.tick(at(0)).await.unwrap();
        assert!(h.engine.state().is_idle());
    }

    #[tokio::test]
    async fn should_start_smallest_id_and_skip_the_others() {
        let mut settings = UserSettings::default();
        settings.automatic_programs_enabled = true;
        let h = harness_with(
            settings,
            vec![
                program("10", "06:00", &[(1, 1)]),
                program("2", "06:00", &[(0, 1)]),
            ],
            None,
        );

        h.engine.tick(at(0)).await.unwrap();
        assert_eq!(h.engine.state().current_program_id(), Some(&id("2")));

        h.engine.stop_program().await.unwrap();
        h.engine.tick(at(10)).await.unwrap();
        assert!(h.engine.state().is_idle());
        assert_eq!(h.driver.activations(), vec![ZoneId(0)]);
    }

    #[tokio::test]
    async fn should_skip_slot_when_engine_busy_at_activation_time() {
        let mut settings = UserSettings::default();
        settings.automatic_programs_enabled = true;
        let h = harness_with(settings, vec![program("1", "06:00", &[(0, 1)])], None);

        h.engine.start_zone(ZoneId(3), 10).await.unwrap();
        h.engine.tick(at(0)).await.unwrap();
        h.engine.stop_zone(ZoneId(3)).await.unwrap();
        h.engine.tick(at(20)).await.unwrap();

        assert!(h.engine.state().is_idle());
        assert_eq!(h.driver.activations(), vec![ZoneId(3)]);
    }

    #[tokio::test]
    async fn should_switch_everything_off_when_recovering_interrupted_run() {
        let zones = UserSettings::default().zones;
        let persisted = ExecutionState {
            program: Some(ProgramRun {
                program_id: id("1"),
                program_name: "P1".to_string(),
                trigger: Trigger::Automatic,
                started_at: t0(),
                phase: Phase::Watering(ZoneRun::new(&zones[0], 60, t0())),
                queue: vec![],
            }),
            ..ExecutionState::default()
        };
        let h = harness_with(UserSettings::default(), vec![], Some(persisted));

        h.engine.recover().await.unwrap();

        let calls = h.driver.calls();
        let deactivated = calls
            .iter()
            .filter(|c| matches!(c, DriverCall::Deactivate(_)))
            .count();
        assert_eq!(deactivated, zones.len());
        assert_eq!(calls.last(), Some(&DriverCall::Relay(false)));
        assert!(h.engine.state().is_idle());
        assert_eq!(h.events.types(), vec![EventType::StateRecovered]);
    }

    #[tokio::test]
    async fn should_not_touch_relays_when_recovering_idle_state() {
        let h = harness(vec![]);
        h.engine.recover().await.unwrap();
        assert!(h.driver.calls().is_empty());
        assert!(h.events.types().is_empty());
    }

    #[tokio::test]
    async fn should_stop_running_program_when_it_is_replaced() {
        let h = harness(vec![]);
        let saved = h
            .engine
            .save_program(program("", "05:00", &[(0, 5)]))
            .await
            .unwrap();
        h.engine.start_program(&saved.id, Trigger::Manual).await.unwrap();

        let mut edited = saved.clone();
        edited.steps[0].duration_minutes = 10;
        h.engine.update_program(edited).await.unwrap();

        assert!(h.engine.state().is_idle());
        assert_eq!(h.driver.energized(), 0);
    }

    #[tokio::test]
    async fn should_keep_running_when_replacement_is_invalid() {
        let h = harness(vec![]);
        let saved = h
            .engine
            .save_program(program("", "05:00", &[(0, 5)]))
            .await
            .unwrap();
        h.engine.start_program(&saved.id, Trigger::Manual).await.unwrap();

        let mut edited = saved.clone();
        edited.steps[0].zone_id = ZoneId(77);
        assert!(h.engine.update_program(edited).await.is_err());
        assert!(h.engine.state().running());
    }

    #[tokio::test]
    async fn should_stop_running_program_when_deleted() {
        let h = harness(vec![program("1", "05:00", &[(0, 5)])]);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();
        h.engine.delete_program(&id("1")).await.unwrap();
        assert!(h.engine.state().is_idle());
        assert!(h.engine.programs().await.unwrap().is_empty());
        assert!(h.events.types().contains(&EventType::ProgramDeleted));
    }

    #[tokio::test]
    async fn should_clear_everything_on_factory_reset() {
        let mut settings = UserSettings::default();
        settings.automatic_programs_enabled = true;
        let h = harness_with(settings, vec![program("1", "05:00", &[(0, 5)])], None);
        h.engine.start_program(&id("1"), Trigger::Manual).await.unwrap();

        h.engine.reset_factory_data().await.unwrap();

        assert!(h.engine.state().is_idle());
        assert!(h.engine.programs().await.unwrap().is_empty());
        assert_eq!(h.engine.settings().await.unwrap(), UserSettings::default());
    }

    #[tokio::test]
    async fn should_stop_activity_before_applying_new_settings() {
        let h = harness(vec![]);
        h.engine.start_zone(ZoneId(0), 5).await.unwrap();

        let mut settings = UserSettings::default();
        settings.zones[0].pin = 30;
        h.engine.save_settings(settings).await.unwrap();

        assert!(h.engine.state().is_idle());
        assert_eq!(h.engine.settings().await.unwrap().zones[0].pin, 30);
    }

    #[tokio::test]
    async fn should_publish_snapshots_to_subscribers() {
        let h = harness(vec![]);
        let mut rx = h.engine.subscribe();
        h.engine.start_zone(ZoneId(1), 5).await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_zone_active(ZoneId(1)));
    }
}

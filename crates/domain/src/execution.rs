//! Execution state: what is watering right now.
//!
//! The state is a plain value owned by the engine. Time moves forward only
//! through [`ExecutionState::advance`], a pure function that returns the next
//! state together with the relay [`Effect`]s the engine must apply.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{ProgramId, ZoneId};
use crate::program::ProgramStep;
use crate::time::Timestamp;
use crate::zone::{self, Zone};

/// Who started a program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Automatic,
}

impl Trigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
        }
    }
}

/// A single energized zone with its countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRun {
    pub zone_id: ZoneId,
    pub name: String,
    pub total_seconds: u32,
    pub remaining_seconds: u32,
    pub started_at: Timestamp,
}

impl ZoneRun {
    #[must_use]
    pub fn new(zone: &Zone, seconds: u32, now: Timestamp) -> Self {
        Self {
            zone_id: zone.id,
            name: zone.name.clone(),
            total_seconds: seconds,
            remaining_seconds: seconds,
            started_at: now,
        }
    }

    fn for_step(step: &ProgramStep, zones: &[Zone], now: Timestamp) -> Self {
        let name = zone::find(zones, step.zone_id)
            .map_or_else(|| format!("Zona {}", step.zone_id), |z| z.name.clone());
        let seconds = step.duration_seconds();
        Self {
            zone_id: step.zone_id,
            name,
            total_seconds: seconds,
            remaining_seconds: seconds,
            started_at: now,
        }
    }
}

/// Where a program run currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Phase {
    /// One zone is on.
    Watering(ZoneRun),
    /// Every zone is off until `next` starts.
    Delay {
        remaining_seconds: u32,
        next: ProgramStep,
    },
}

/// A program in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRun {
    pub program_id: ProgramId,
    pub program_name: String,
    pub trigger: Trigger,
    pub started_at: Timestamp,
    pub phase: Phase,
    /// Steps not started yet, in order.
    pub queue: Vec<ProgramStep>,
}

/// The last hardware failure, kept until the next successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<ZoneId>,
    pub at: Timestamp,
}

/// Relay change requested by [`ExecutionState::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Deactivate(ZoneId),
    Activate { zone_id: ZoneId, seconds: u32 },
    Completed {
        program_id: ProgramId,
        program_name: String,
        trigger: Trigger,
    },
}

/// Everything the engine is currently running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default)]
    pub program: Option<ProgramRun>,
    #[serde(default)]
    pub manual: BTreeMap<ZoneId, ZoneRun>,
    #[serde(default)]
    pub fault: Option<Fault>,
}

impl ExecutionState {
    #[must_use]
    pub fn running(&self) -> bool {
        self.program.is_some()
    }

    /// Nothing is on and no program is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.program.is_none() && self.manual.is_empty()
    }

    #[must_use]
    pub fn trigger(&self) -> Option<Trigger> {
        self.program.as_ref().map(|run| run.trigger)
    }

    #[must_use]
    pub fn current_program_id(&self) -> Option<&ProgramId> {
        self.program.as_ref().map(|run| &run.program_id)
    }

    /// The program zone currently energized, absent during a delay.
    #[must_use]
    pub fn active_zone(&self) -> Option<&ZoneRun> {
        match self.program.as_ref().map(|run| &run.phase) {
            Some(Phase::Watering(zone_run)) => Some(zone_run),
            _ => None,
        }
    }

    #[must_use]
    pub fn delay_remaining(&self) -> Option<u32> {
        match self.program.as_ref().map(|run| &run.phase) {
            Some(Phase::Delay {
                remaining_seconds, ..
            }) => Some(*remaining_seconds),
            _ => None,
        }
    }

    /// Steps still to come, the one waiting behind a delay included.
    #[must_use]
    pub fn queue(&self) -> Vec<ProgramStep> {
        let Some(run) = &self.program else {
            return Vec::new();
        };
        let mut queue = Vec::with_capacity(run.queue.len() + 1);
        if let Phase::Delay { next, .. } = &run.phase {
            queue.push(*next);
        }
        queue.extend(run.queue.iter().copied());
        queue
    }

    /// Every zone currently energized, program and manual.
    #[must_use]
    pub fn active_zone_ids(&self) -> Vec<ZoneId> {
        self.active_zone()
            .map(|z| z.zone_id)
            .into_iter()
            .chain(self.manual.keys().copied())
            .collect()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        usize::from(self.active_zone().is_some()) + self.manual.len()
    }

    #[must_use]
    pub fn is_zone_active(&self, zone_id: ZoneId) -> bool {
        self.zone_run(zone_id).is_some()
    }

    /// Countdown of an energized zone.
    #[must_use]
    pub fn zone_run(&self, zone_id: ZoneId) -> Option<&ZoneRun> {
        self.active_zone()
            .filter(|z| z.zone_id == zone_id)
            .or_else(|| self.manual.get(&zone_id))
    }

    /// Move time forward by `elapsed_secs`.
    ///
    /// Returns the next state and the relay changes the engine must apply, in
    /// order. Time left over when a step or delay ends carries into the next
    /// phase, so a long tick lands where a series of short ticks would have.
    /// `delay_seconds` is the pause inserted between two program steps.
    #[must_use]
    pub fn advance(
        mut self,
        elapsed_secs: u32,
        now: Timestamp,
        zones: &[Zone],
        delay_seconds: u32,
    ) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();

        let mut expired = Vec::new();
        for (zone_id, zone_run) in &mut self.manual {
            zone_run.remaining_seconds = zone_run.remaining_seconds.saturating_sub(elapsed_secs);
            if zone_run.remaining_seconds == 0 {
                expired.push(*zone_id);
            }
        }
        for zone_id in expired {
            self.manual.remove(&zone_id);
            effects.push(Effect::Deactivate(zone_id));
        }

        if let Some(run) = self.program.take() {
            self.program = advance_program(run, elapsed_secs, now, zones, delay_seconds, &mut effects);
        }

        (self, effects)
    }
}

fn advance_program(
    mut run: ProgramRun,
    mut elapsed: u32,
    now: Timestamp,
    zones: &[Zone],
    delay_seconds: u32,
    effects: &mut Vec<Effect>,
) -> Option<ProgramRun> {
    loop {
        match &mut run.phase {
            Phase::Watering(zone_run) => {
                if zone_run.remaining_seconds > elapsed {
                    zone_run.remaining_seconds -= elapsed;
                    return Some(run);
                }
                elapsed -= zone_run.remaining_seconds;
                effects.push(Effect::Deactivate(zone_run.zone_id));
                if run.queue.is_empty() {
                    effects.push(Effect::Completed {
                        program_id: run.program_id,
                        program_name: run.program_name,
                        trigger: run.trigger,
                    });
                    return None;
                }
                let next = run.queue.remove(0);
                run.phase = if delay_seconds > 0 {
                    Phase::Delay {
                        remaining_seconds: delay_seconds,
                        next,
                    }
                } else {
                    start_step(&next, zones, now, effects)
                };
            }
            Phase::Delay {
                remaining_seconds,
                next,
            } => {
                if *remaining_seconds > elapsed {
                    *remaining_seconds -= elapsed;
                    return Some(run);
                }
                elapsed -= *remaining_seconds;
                let next = *next;
                run.phase = start_step(&next, zones, now, effects);
            }
        }
    }
}

fn start_step(step: &ProgramStep, zones: &[Zone], now: Timestamp, effects: &mut Vec<Effect>) -> Phase {
    let zone_run = ZoneRun::for_step(step, zones, now);
    effects.push(Effect::Activate {
        zone_id: zone_run.zone_id,
        seconds: zone_run.total_seconds,
    });
    Phase::Watering(zone_run)
}

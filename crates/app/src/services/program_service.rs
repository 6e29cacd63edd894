//! Program service: the program store.
//!
//! Validates programs against each other and the configured zones before
//! anything is written; a rejected save leaves the store untouched.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use irrigo_domain::error::{IrrigoError, NotFoundError, ValidationError};
use irrigo_domain::id::ProgramId;
use irrigo_domain::program::Program;
use irrigo_domain::zone::{self, Zone};

use crate::ports::ProgramRepository;

/// Application service for program CRUD operations.
pub struct ProgramService<R> {
    repo: R,
}

fn not_found(id: &ProgramId) -> IrrigoError {
    NotFoundError {
        entity: "Program",
        id: id.to_string(),
    }
    .into()
}

impl<R: ProgramRepository> ProgramService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Look up a program by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] when no program with `id` exists,
    /// or a storage error from the repository.
    pub async fn get(&self, id: &ProgramId) -> Result<Program, IrrigoError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// All programs keyed by id, in id order.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list(&self) -> Result<BTreeMap<ProgramId, Program>, IrrigoError> {
        let programs = self.repo.get_all().await?;
        Ok(programs.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    /// Insert or replace a program.
    ///
    /// A program with an empty id receives the next free numeric id.
    /// Replacing keeps the stored `last_run_date` unless the new value sets one.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::Validation`] when the program is invalid on its
    /// own, references a zone missing from `zones`, shares its name with
    /// another program, or collides with another program's schedule.
    #[tracing::instrument(skip(self, program, zones), fields(program_id = %program.id, program_name = %program.name))]
    pub async fn save(&self, mut program: Program, zones: &[Zone]) -> Result<Program, IrrigoError> {
        program.validate()?;
        program.name = program.name.trim().to_string();
        for step in &program.steps {
            if zone::find(zones, step.zone_id).is_none() {
                return Err(ValidationError::UnknownZone(step.zone_id).into());
            }
        }

        let existing = self.repo.get_all().await?;
        if program.id.as_str().trim().is_empty() {
            program.id = next_id(&existing);
        } else if let Some(current) = existing.iter().find(|p| p.id == program.id) {
            program.last_run_date = program.last_run_date.or(current.last_run_date);
        }
        for other in existing.iter().filter(|p| p.id != program.id) {
            if other.name.to_lowercase() == program.name.to_lowercase() {
                return Err(ValidationError::DuplicateName(program.name).into());
            }
            if other.activation_time == program.activation_time
                && other.months.overlaps(program.months)
            {
                return Err(ValidationError::ScheduleConflict(other.name.clone()).into());
            }
        }

        let saved = self.repo.save(program).await?;
        tracing::info!(program_id = %saved.id, "program saved");
        Ok(saved)
    }

    /// Replace an existing program.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyId`] without an id,
    /// [`IrrigoError::NotFound`] when the id is unknown, and everything
    /// [`save`](Self::save) returns.
    pub async fn update(&self, program: Program, zones: &[Zone]) -> Result<Program, IrrigoError> {
        if program.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyId.into());
        }
        self.get(&program.id).await?;
        self.save(program, zones).await
    }

    /// Delete a program by id.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] when no program with `id` exists.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &ProgramId) -> Result<(), IrrigoError> {
        if self.repo.delete(id).await? {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    /// Delete every program.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn delete_all(&self) -> Result<(), IrrigoError> {
        self.repo.delete_all().await
    }

    /// Switch automatic scheduling of one program on or off.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] when no program with `id` exists.
    #[tracing::instrument(skip(self))]
    pub async fn set_automatic(&self, id: &ProgramId, enabled: bool) -> Result<Program, IrrigoError> {
        let mut program = self.get(id).await?;
        program.automatic_enabled = enabled;
        self.repo.save(program).await
    }

    /// Record that a program finished a run on `date`.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::NotFound`] when the program was deleted meanwhile.
    pub async fn mark_run(&self, id: &ProgramId, date: NaiveDate) -> Result<Program, IrrigoError> {
        let mut program = self.get(id).await?;
        program.last_run_date = Some(date);
        self.repo.save(program).await
    }
}

fn next_id(existing: &[Program]) -> ProgramId {
    let max = existing
        .iter()
        .filter_map(|p| p.id.as_number())
        .max()
        .unwrap_or(0);
    ProgramId::new((max + 1).to_string())
}

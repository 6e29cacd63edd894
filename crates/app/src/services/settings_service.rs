//! Settings service: zone layout, safety limits and the global automatic switch.

use irrigo_domain::error::IrrigoError;
use irrigo_domain::settings::UserSettings;

use crate::ports::SettingsRepository;

/// Application service for the [`UserSettings`] record.
pub struct SettingsService<R> {
    repo: R,
}

impl<R: SettingsRepository> SettingsService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Current settings; defaults until the first save.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn get(&self) -> Result<UserSettings, IrrigoError> {
        Ok(self.repo.load().await?.unwrap_or_default())
    }

    /// Validate and replace the settings.
    ///
    /// # Errors
    ///
    /// Returns [`IrrigoError::Validation`] if invariants fail, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self, settings))]
    pub async fn save(&self, settings: UserSettings) -> Result<UserSettings, IrrigoError> {
        settings.validate()?;
        self.repo.save(settings).await
    }

    /// Put the defaults back.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn reset(&self) -> Result<UserSettings, IrrigoError> {
        self.repo.save(UserSettings::default()).await
    }

    /// Switch automatic programs on or off globally.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn set_automatic_programs(&self, enabled: bool) -> Result<UserSettings, IrrigoError> {
        let mut settings = self.get().await?;
        settings.automatic_programs_enabled = enabled;
        self.repo.save(settings).await
    }
}

//! Persisted maintenance settings.
//!
//! Settings live in the metadata database rather than in process memory so
//! every handler and the background sweep read the same committed values.

use thiserror::Error;

use crate::storage::models::MaintenanceSettings;
use crate::storage::{Database, DatabaseError};

const MAINTENANCE_KEY: &str = "maintenance";

/// Shortest allowed non-zero sweep interval
pub const MIN_SWEEP_INTERVAL_SECS: u64 = 60;

/// Upper bound on the retention window (ten years)
pub const MAX_RETENTION_DAYS: u32 = 3650;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid settings: {0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Storage seam for maintenance settings.
pub trait SettingsRepository: Send + Sync {
    /// Saved settings, or `fallback` when nothing has been saved yet.
    fn load_maintenance(
        &self,
        fallback: &MaintenanceSettings,
    ) -> Result<MaintenanceSettings, SettingsError>;

    fn save_maintenance(&self, settings: &MaintenanceSettings) -> Result<(), SettingsError>;
}

impl SettingsRepository for Database {
    fn load_maintenance(
        &self,
        fallback: &MaintenanceSettings,
    ) -> Result<MaintenanceSettings, SettingsError> {
        Ok(self
            .get_setting(MAINTENANCE_KEY)?
            .unwrap_or_else(|| fallback.clone()))
    }

    fn save_maintenance(&self, settings: &MaintenanceSettings) -> Result<(), SettingsError> {
        validate(settings)?;
        self.put_setting(MAINTENANCE_KEY, settings)?;
        Ok(())
    }
}

/// Reject settings the sweep cannot honour.
pub fn validate(settings: &MaintenanceSettings) -> Result<(), SettingsError> {
    if settings.retention_days > MAX_RETENTION_DAYS {
        return Err(SettingsError::Invalid(format!(
            "retention_days must be at most {MAX_RETENTION_DAYS}"
        )));
    }
    if settings.sweep_interval_secs != 0 && settings.sweep_interval_secs < MIN_SWEEP_INTERVAL_SECS
    {
        return Err(SettingsError::Invalid(format!(
            "sweep_interval_secs must be 0 (disabled) or at least {MIN_SWEEP_INTERVAL_SECS}"
        )));
    }
    Ok(())
}

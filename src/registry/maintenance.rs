use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use super::{Registry, RegistryError};
use crate::object_store::ObjectStoreError;
use crate::settings::SettingsRepository;
use crate::storage::models::{FileRecord, MaintenanceSettings, RegistryStats};

/// How often a disabled sweeper re-reads its settings.
const DISABLED_RECHECK: Duration = Duration::from_secs(60);

/// A candidate the reclamation pass could not fully delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupFailure {
    pub file_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub deleted: u64,
    pub errors: Vec<CleanupFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub marked: u64,
    pub cleanup: CleanupReport,
}

enum Reclaim {
    Deleted,
    /// Record removed, but its bytes were already gone.
    MissingBytes,
    /// Referenced again (or removed) since the candidate list was built.
    Skipped,
}

impl Registry {
    /// Stamp every unreferenced, unstamped record. Returns how many were stamped.
    pub fn mark_orphaned(&self) -> Result<u64, RegistryError> {
        self.mark_orphaned_at(Utc::now())
    }

    pub fn mark_orphaned_at(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let marked = self.db.mark_orphaned(now)?;
        if marked > 0 {
            tracing::info!(marked, "Marked orphaned files");
        }
        Ok(marked)
    }

    /// Delete files orphaned for longer than `retention_days`.
    pub async fn cleanup(&self, retention_days: u32) -> Result<CleanupReport, RegistryError> {
        self.cleanup_at(retention_days, Utc::now()).await
    }

    /// Reclaim every record orphaned before `now - retention_days`. Failures are
    /// collected per file and never stop the pass.
    pub async fn cleanup_at(
        &self,
        retention_days: u32,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, RegistryError> {
        let Some(cutoff) = now.checked_sub_signed(chrono::Duration::days(i64::from(retention_days)))
        else {
            return Ok(CleanupReport::default());
        };
        let candidates = self.db.orphans_older_than(cutoff)?;
        let mut report = CleanupReport::default();

        for file in &candidates {
            match self.reclaim(file, cutoff).await {
                Ok(Reclaim::Deleted) => report.deleted += 1,
                Ok(Reclaim::Skipped) => {
                    tracing::debug!(file_id = %file.id, "Skipped reclaim, file referenced again");
                }
                Ok(Reclaim::MissingBytes) => {
                    tracing::warn!(file_id = %file.id, path = %file.path, "Stored bytes already missing");
                    report.errors.push(CleanupFailure {
                        file_id: file.id.clone(),
                        error: format!("stored bytes missing at '{}'; record removed", file.path),
                    });
                }
                Err(e) => {
                    tracing::warn!(file_id = %file.id, error = %e, "Failed to reclaim file");
                    report.errors.push(CleanupFailure {
                        file_id: file.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            candidates = candidates.len(),
            deleted = report.deleted,
            errors = report.errors.len(),
            retention_days,
            "Cleanup pass complete"
        );
        Ok(report)
    }

    /// Delete the bytes, then the record, holding the content lock so no
    /// registration can revive the content in between.
    async fn reclaim(&self, file: &FileRecord, cutoff: DateTime<Utc>) -> Result<Reclaim, RegistryError> {
        let _guard = self.locks.lock(&file.content_hash).await;

        match self.db.get_file(&file.id)? {
            Some(current) if current.is_reclaimable(cutoff) => {}
            _ => return Ok(Reclaim::Skipped),
        }

        let missing = match self.object_store.delete(&file.path).await {
            Ok(()) => false,
            Err(ObjectStoreError::NotFound(_)) => true,
            Err(e) => return Err(e.into()),
        };

        if !self.db.delete_orphan(&file.id, cutoff)? {
            return Ok(Reclaim::Skipped);
        }

        tracing::debug!(file_id = %file.id, bytes = file.byte_size, "Reclaimed file");
        Ok(if missing {
            Reclaim::MissingBytes
        } else {
            Reclaim::Deleted
        })
    }

    pub fn get_stats(&self) -> Result<RegistryStats, RegistryError> {
        Ok(self.db.stats()?)
    }

    /// One full maintenance cycle: mark, then reclaim.
    pub async fn sweep(&self, retention_days: u32) -> Result<SweepReport, RegistryError> {
        let marked = self.mark_orphaned()?;
        let cleanup = self.cleanup(retention_days).await?;
        Ok(SweepReport { marked, cleanup })
    }
}

/// Run [`Registry::sweep`] on the interval stored in the settings repository.
/// Settings are re-read every cycle, so changes apply without a restart.
pub fn spawn_sweeper(
    registry: Arc<Registry>,
    settings: Arc<dyn SettingsRepository>,
    fallback: MaintenanceSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let current = match settings.load_maintenance(&fallback) {
                Ok(current) => current,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load maintenance settings, using defaults");
                    fallback.clone()
                }
            };

            if current.sweep_interval_secs == 0 {
                tokio::time::sleep(DISABLED_RECHECK).await;
                continue;
            }

            tokio::time::sleep(Duration::from_secs(current.sweep_interval_secs)).await;

            match registry.sweep(current.retention_days).await {
                Ok(report) => tracing::info!(
                    marked = report.marked,
                    deleted = report.cleanup.deleted,
                    errors = report.cleanup.errors.len(),
                    "Background sweep finished"
                ),
                Err(e) => tracing::error!(error = %e, "Background sweep failed"),
            }
        }
    })
}

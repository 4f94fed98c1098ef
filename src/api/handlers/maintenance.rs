use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{MaintenanceError, MaintenanceSuccess};
use crate::registry::CleanupFailure;
use crate::settings::MAX_RETENTION_DAYS;
use crate::storage::models::RegistryStats;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRequest {
    pub action: String,
    #[serde(default)]
    pub older_than_days: Option<i64>,
}

/// Action-specific fields of a successful maintenance response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MaintenanceOutcome {
    Marked {
        marked: u64,
    },
    Cleaned {
        deleted: u64,
        errors: Vec<CleanupFailure>,
        #[serde(rename = "olderThanDays")]
        older_than_days: u32,
    },
    Stats {
        stats: RegistryStats,
    },
}

// ============================================================================
// Handlers
// ============================================================================

/// Route: POST /admin/file-cleanup
pub async fn file_cleanup(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MaintenanceRequest>, JsonRejection>,
) -> Result<Json<MaintenanceSuccess<MaintenanceOutcome>>, MaintenanceError> {
    let Json(req) = body.map_err(|e| MaintenanceError::validation(e.body_text()))?;

    match req.action.as_str() {
        "mark_orphaned" => {
            let marked = state.registry.mark_orphaned()?;
            Ok(MaintenanceSuccess::new(
                Some(format!("Marked {marked} files as orphaned")),
                MaintenanceOutcome::Marked { marked },
            ))
        }
        "cleanup" => {
            let older_than_days = match req.older_than_days {
                Some(days) => validate_days(days)?,
                None => {
                    state
                        .settings
                        .load_maintenance(&state.config.maintenance)
                        .map_err(|e| MaintenanceError::internal(e.to_string()))?
                        .retention_days
                }
            };

            let report = state.registry.cleanup(older_than_days).await?;
            Ok(MaintenanceSuccess::new(
                Some(format!(
                    "Deleted {} orphaned files older than {older_than_days} days",
                    report.deleted
                )),
                MaintenanceOutcome::Cleaned {
                    deleted: report.deleted,
                    errors: report.errors,
                    older_than_days,
                },
            ))
        }
        "stats" => {
            let stats = state.registry.get_stats()?;
            Ok(MaintenanceSuccess::new(
                None,
                MaintenanceOutcome::Stats { stats },
            ))
        }
        other => Err(MaintenanceError::validation(format!(
            "unknown action '{other}'; expected mark_orphaned, cleanup, or stats"
        ))),
    }
}

/// Route: GET /admin/file-cleanup
pub async fn file_cleanup_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MaintenanceSuccess<MaintenanceOutcome>>, MaintenanceError> {
    let stats = state.registry.get_stats()?;
    Ok(MaintenanceSuccess::new(
        None,
        MaintenanceOutcome::Stats { stats },
    ))
}

fn validate_days(days: i64) -> Result<u32, MaintenanceError> {
    if !(0..=i64::from(MAX_RETENTION_DAYS)).contains(&days) {
        return Err(MaintenanceError::validation(format!(
            "olderThanDays must be between 0 and {MAX_RETENTION_DAYS}"
        )));
    }
    Ok(days as u32)
}

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::settings::SettingsError;
use crate::storage::models::MaintenanceSettings;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<MaintenanceSettings>>, ApiError> {
    let settings = state
        .settings
        .load_maintenance(&state.config.maintenance)
        .map_err(settings_error)?;
    Ok(JSend::success(settings))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<UpdateSettingsRequest>,
) -> Result<Json<JSend<MaintenanceSettings>>, ApiError> {
    if req.retention_days.is_none() && req.sweep_interval_secs.is_none() {
        return Err(ApiError::bad_request(
            "at least one field (retention_days, sweep_interval_secs) must be provided",
        ));
    }

    let mut settings = state
        .settings
        .load_maintenance(&state.config.maintenance)
        .map_err(settings_error)?;
    if let Some(days) = req.retention_days {
        settings.retention_days = days;
    }
    if let Some(secs) = req.sweep_interval_secs {
        settings.sweep_interval_secs = secs;
    }

    state
        .settings
        .save_maintenance(&settings)
        .map_err(settings_error)?;

    tracing::info!(
        retention_days = settings.retention_days,
        sweep_interval_secs = settings.sweep_interval_secs,
        "Updated maintenance settings"
    );
    Ok(JSend::success(settings))
}

fn settings_error(e: SettingsError) -> ApiError {
    match e {
        SettingsError::Invalid(msg) => ApiError::bad_request(msg),
        SettingsError::Database(e) => ApiError::internal(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;

    #[tokio::test]
    async fn test_settings_default_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let Json(resp) = get_settings(State(Arc::clone(&state))).await.unwrap();
        assert_eq!(resp.data, state.config.maintenance);
    }

    #[tokio::test]
    async fn test_partial_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let Json(resp) = update_settings(
            State(Arc::clone(&state)),
            AppJson(UpdateSettingsRequest {
                retention_days: Some(30),
                sweep_interval_secs: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.data.retention_days, 30);
        assert_eq!(
            resp.data.sweep_interval_secs,
            state.config.maintenance.sweep_interval_secs
        );

        let Json(reloaded) = get_settings(State(state)).await.unwrap();
        assert_eq!(reloaded.data.retention_days, 30);
    }

    #[tokio::test]
    async fn test_invalid_interval_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let err = update_settings(
            State(state),
            AppJson(UpdateSettingsRequest {
                retention_days: None,
                sweep_interval_secs: Some(1),
            }),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, ApiError::Fail(code, _) if code == axum::http::StatusCode::BAD_REQUEST)
        );
    }
}

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::files::{file_to_response, normalize_owner, FileResponse};
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ReferenceRequest {
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OwnerReleaseResponse {
    pub owner: String,
    pub released: Vec<FileResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Route: POST /files/:id/references
pub async fn add_reference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<ReferenceRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let owner = normalize_owner(req.owner)?;
    let file = state.registry.add_reference(&id, owner.as_deref()).await?;
    Ok(JSend::success(file_to_response(&file)))
}

/// Route: DELETE /files/:id/references?owner=...
pub async fn release_reference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppQuery(req): AppQuery<ReferenceRequest>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let owner = normalize_owner(req.owner)?;
    let file = state.registry.release(&id, owner.as_deref())?;
    Ok(JSend::success(file_to_response(&file)))
}

/// Route: GET /owners/:owner/files
pub async fn owner_files(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> Result<Json<JSend<Vec<FileResponse>>>, ApiError> {
    let files = state.registry.files_for_owner(&owner)?;
    Ok(JSend::success(files.iter().map(file_to_response).collect()))
}

/// Route: DELETE /owners/:owner/references
pub async fn release_owner(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> Result<Json<JSend<OwnerReleaseResponse>>, ApiError> {
    let released = state.registry.release_owner(&owner)?;
    Ok(JSend::success(OwnerReleaseResponse {
        released: released.iter().map(file_to_response).collect(),
        owner,
    }))
}

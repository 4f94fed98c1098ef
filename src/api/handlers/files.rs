use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::registry::UploadMetadata;
use crate::storage::models::{FileRecord, FileState, FileType};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub byte_size: u64,
    pub content_hash: String,
    pub created_at: String,
    pub file_type: FileType,
    pub id: String,
    pub mime_type: String,
    pub orphaned_at: Option<String>,
    pub original_name: Option<String>,
    pub reference_count: u64,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub file: FileResponse,
    /// True when identical content was already stored and only a reference was added.
    pub deduplicated: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub state: Option<FileState>,
    #[serde(default)]
    pub owner: Option<String>,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut file_content_type: Option<String> = None;
    let mut owner: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_content_type = field.content_type().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }
                file_data = Some(data);
            }
            "owner" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid owner: {e}")))?;
                owner = Some(text);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let file_data = file_data.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    let owner = normalize_owner(owner)?;

    // Determine MIME type: from multipart Content-Type, or guess from filename, or fallback
    let mime_type = file_content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            file_name
                .as_deref()
                .and_then(|n| mime_guess::from_path(n).first())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let registration = state
        .registry
        .register(
            file_data,
            UploadMetadata {
                mime_type,
                original_name: file_name,
                owner,
            },
        )
        .await?;

    Ok(JSend::success(UploadResponse {
        file: file_to_response(&registration.record),
        deduplicated: !registration.created,
    }))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.registry.get(&id)?;
    Ok(JSend::success(file_to_response(&file)))
}

/// Serve the stored bytes of a file.
/// Route: GET /files/:id/content
pub async fn get_file_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (file, data) = state.registry.read_content(&id).await?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(file.byte_size),
    );

    let filename = file.original_name.as_deref().unwrap_or(&file.id);
    if let Ok(value) = format!("inline; filename=\"{}\"", filename.replace('"', "")).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Content never changes under a given id
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    if let Ok(value) = format!("\"{}\"", file.content_hash).parse() {
        headers.insert(header::ETAG, value);
    }

    Ok(response)
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let files = state
        .registry
        .list(params.state, params.owner.as_deref())?;

    let total = files.len() as u64;
    let items: Vec<FileResponse> = files
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(file_to_response)
        .collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

// ============================================================================
// Helpers
// ============================================================================

pub(super) fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        byte_size: file.byte_size,
        content_hash: file.content_hash.clone(),
        created_at: file.created_at.to_rfc3339(),
        file_type: file.file_type,
        id: file.id.clone(),
        mime_type: file.mime_type.clone(),
        orphaned_at: file.orphaned_at.map(|t| t.to_rfc3339()),
        original_name: file.original_name.clone(),
        reference_count: file.reference_count,
        updated_at: file.updated_at.to_rfc3339(),
    }
}

/// Trim an optional owner label; an empty label is a client error, not "no owner".
pub(super) fn normalize_owner(owner: Option<String>) -> Result<Option<String>, ApiError> {
    match owner {
        Some(o) if o.trim().is_empty() => Err(ApiError::bad_request("owner must not be empty")),
        Some(o) => Ok(Some(o.trim().to_string())),
        None => Ok(None),
    }
}

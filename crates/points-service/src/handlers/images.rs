//! Image upload and retrieval handlers.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::points::parse_account_id;
use crate::images::{content_type, Upload};
use crate::state::AppState;

/// Upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Stored file name.
    pub filename: String,
    /// Path relative to the storage root.
    pub path: String,
    /// Category directory.
    pub category: String,
    /// Nested directory, if any.
    pub sub_directory: Option<String>,
}

/// Upload an image into an account's directory.
///
/// Multipart fields: `file` (required), `sub_directory`, `file_name`.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path((account_id, category)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let parsed = parse_account_id(&account_id)?;
    if state.store.get_account(&parsed).await?.is_none() {
        return Err(ApiError::NotFound(format!("account not found: {account_id}")));
    }

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut sub_directory = None;
    let mut file_name = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((original, bytes.to_vec()));
            }
            "sub_directory" => sub_directory = Some(field.text().await?),
            "file_name" => file_name = Some(field.text().await?),
            _ => {}
        }
    }

    let (original_name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("file field is required".into()))?;
    let sub_directory = sub_directory.filter(|s| !s.is_empty());
    let file_name = file_name.filter(|s| !s.is_empty());

    let stored = state
        .images
        .save(
            &Upload {
                account_id: &account_id,
                category: &category,
                sub_directory: sub_directory.as_deref(),
                original_name: &original_name,
                file_name: file_name.as_deref(),
                bytes: &bytes,
            },
            Utc::now(),
        )
        .await?;

    tracing::info!(
        account_id = %account_id,
        path = %stored.path,
        size = bytes.len(),
        "Image uploaded"
    );

    Ok(Json(UploadResponse {
        filename: stored.filename,
        path: stored.path,
        category,
        sub_directory,
    }))
}

/// Serve an image.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.images.read(&path).await?;
    let mime = content_type(&path)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid file type: {path}")))?;

    Ok(([(CONTENT_TYPE, mime), (CACHE_CONTROL, "max-age=3600")], bytes))
}

/// List an account's stored images.
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let parsed = parse_account_id(&account_id)?;
    if state.store.get_account(&parsed).await?.is_none() {
        return Err(ApiError::NotFound(format!("account not found: {account_id}")));
    }
    Ok(Json(state.images.list(&account_id).await?))
}

/// Delete an image.
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(path): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.images.delete(&path).await?;
    tracing::info!(admin_id = %admin.admin_id, path = %path, "Image deleted");
    Ok(Json(serde_json::json!({ "message": "File deleted successfully" })))
}

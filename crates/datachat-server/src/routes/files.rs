//! File upload, binding lookup and preview routes.

use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use datachat_core::DatachatError;
use datachat_types::FileBinding;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Accepted upload extensions: tabular formats plus documents the client
/// may attach for reference.
const ALLOWED_EXTENSIONS: [&str; 4] = ["csv", "tsv", "txt", "pdf"];

/// Extensions the table loader can parse for querying and preview.
const TABULAR_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

const DEFAULT_PREVIEW_ROWS: usize = 10;
const MAX_PREVIEW_ROWS: usize = 100;

/// Get the file currently bound to a session.
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<FileBinding>, (StatusCode, String)> {
    let binding = state
        .store
        .get_file(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "No file bound to session".to_string()))?;

    Ok(Json(binding))
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_name: String,
    /// Set only for tabular uploads that were bound as the query table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
}

/// Upload a file for a session. Tabular uploads must be loadable and get
/// bound as the session's query table; a newer tabular upload replaces the
/// binding (the previous file stays on disk). Document uploads are stored
/// without a binding so they never route turns down the file-backed path.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), (StatusCode, String)> {
    let exists = state
        .store
        .session_exists(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if !exists {
        return Err((StatusCode::NOT_FOUND, "Session not found".to_string()));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(|n| n.to_string()) else {
            continue;
        };
        let sanitized = sanitize_filename(&file_name);
        let extension = extension_of(&sanitized)
            .ok_or((StatusCode::BAD_REQUEST, "Missing file extension".to_string()))?;
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err((
                StatusCode::BAD_REQUEST,
                DatachatError::FileTypeNotAllowed(extension).to_string(),
            ));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

        let stored_path = state
            .config
            .upload_dir
            .join(format!("session_{}_{}", id, sanitized));
        tokio::fs::write(&stored_path, &bytes)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        let table_name = if TABULAR_EXTENSIONS.contains(&extension.as_str()) {
            // Tabular files must be loadable before we bind them
            datachat_core::load_table(&stored_path)
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

            // Table name comes from the uploaded filename, not the prefixed
            // storage path.
            let table_name = datachat_core::table_name_for(std::path::Path::new(&sanitized));
            state
                .store
                .bind_file(id, &stored_path, &table_name)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            info!(
                target: "datachat::api",
                "Bound file '{}' to session {} as table '{}'",
                sanitized, id, table_name
            );
            Some(table_name)
        } else {
            info!(
                target: "datachat::api",
                "Stored document '{}' for session {} (no table binding)",
                sanitized, id
            );
            None
        };

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                file_name: sanitized,
                table_name,
            }),
        ));
    }

    Err((StatusCode::BAD_REQUEST, "No file in upload".to_string()))
}

#[derive(Deserialize)]
pub struct PreviewParams {
    #[serde(default)]
    pub rows: Option<usize>,
}

#[derive(Serialize)]
pub struct PreviewResponse {
    pub table_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Preview the bound file: a bounded number of rows, with non-finite
/// numerics normalized to null.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<PreviewResponse>, (StatusCode, String)> {
    let binding = state
        .store
        .get_file(id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or((StatusCode::NOT_FOUND, "No file bound to session".to_string()))?;

    let table = datachat_core::load_table(&binding.file_path)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let limit = params
        .rows
        .unwrap_or(DEFAULT_PREVIEW_ROWS)
        .min(MAX_PREVIEW_ROWS);

    Ok(Json(PreviewResponse {
        columns: table.columns.iter().map(|c| c.name.clone()).collect(),
        rows: table.preview_rows(limit),
        table_name: table.table_name,
    }))
}

/// Reduce an uploaded filename to a safe storage-path component.
fn sanitize_filename(name: &str) -> String {
    let base = std::path::Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn extension_of(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

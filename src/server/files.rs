use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use tracing::info;

use super::identity::caller;
use super::state::AppState;
use crate::core::error::{Result, SandchatError};
use crate::core::schemas::FileRef;
use crate::core::utils::user_key;

/// Store an uploaded dataset for the caller and return where it landed.
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(filename): Path<String>,
    body: Bytes,
) -> Result<Json<FileRef>> {
    let filename = normalize_filename(&filename)?;
    let user = caller(&state, &headers);
    let owner = user_key(user.as_deref());

    let dir = state.config.data_dir.join("uploads").join(&owner);
    tokio::fs::create_dir_all(&dir).await?;
    let dir = tokio::fs::canonicalize(&dir).await?;
    let path = dir.join(&filename);
    tokio::fs::write(&path, &body).await?;

    info!(
        user = %owner,
        file = %filename,
        size = body.len(),
        "files.uploaded"
    );
    Ok(Json(FileRef {
        filename,
        path: path.to_string_lossy().to_string(),
        size: body.len() as u64,
    }))
}

/// Trimmed file name, rejecting path separators and `.`/`..`.
fn normalize_filename(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return Err(SandchatError::BadRequest(format!(
            "invalid file name: {name}"
        )));
    }
    Ok(trimmed.to_string())
}

//! 媒体库列表、删除与全部清空。

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::base_system::file_cleaner::purge_dir_contents;
use crate::catalog::storage_usage;
use crate::web::error::ApiError;
use crate::web::state::AppState;

pub(crate) async fn api_library(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let catalog = state.catalog.clone();
    let root = state.layout.root.clone();
    let (files, storage) =
        tokio::task::spawn_blocking(move || catalog.list_all().map(|f| (f, storage_usage(&root))))
            .await??;

    Ok(Json(json!({
        "success": true,
        "files": files,
        "storage": storage,
    })))
}

pub(crate) async fn api_delete_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let catalog = state.catalog.clone();
    let id_for_task = id.clone();
    let removed = tokio::task::spawn_blocking(move || catalog.delete(&id_for_task)).await??;
    if !removed {
        return Err(ApiError::not_found("Media not found"));
    }
    info!(target: "web", id = %id, "media deleted");
    Ok(Json(json!({ "success": true, "message": "Media deleted successfully" })))
}

/// Remove every stored audio and video file and empty the catalog. Safe to
/// repeat.
pub(crate) async fn api_cleanup(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let catalog = state.catalog.clone();
    let dirs = [state.layout.audio.clone(), state.layout.video.clone()];
    let (removed_files, report) = tokio::task::spawn_blocking(move || {
        let mut removed = 0usize;
        for dir in &dirs {
            match purge_dir_contents(dir) {
                Ok(n) => removed += n,
                Err(e) => warn!(target: "web", dir = %dir.display(), error = %e, "cleanup skipped folder"),
            }
        }
        catalog.clear_all().map(|r| (removed, r))
    })
    .await??;

    info!(
        target: "web",
        files = removed_files,
        records = report.media,
        "all media cleaned up"
    );
    Ok(Json(json!({
        "success": true,
        "message": "All media files have been deleted",
        "removed_files": removed_files,
        "removed_records": report.media,
    })))
}

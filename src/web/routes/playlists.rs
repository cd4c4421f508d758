use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::web::error::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct CreatePlaylistReq {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddItemReq {
    pub(crate) media_id: String,
}

pub(crate) async fn create_playlist(
    State(state): State<AppState>,
    Json(req): Json<CreatePlaylistReq>,
) -> Result<Json<Value>, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("Playlist name is required"));
    }
    let catalog = state.catalog.clone();
    let playlist = tokio::task::spawn_blocking(move || {
        catalog.create_playlist(&name, req.description.as_deref())
    })
    .await??;
    Ok(Json(json!({ "success": true, "id": playlist.id, "playlist": playlist })))
}

pub(crate) async fn add_playlist_item(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
    Json(req): Json<AddItemReq>,
) -> Result<Json<Value>, ApiError> {
    let catalog = state.catalog.clone();
    let item = tokio::task::spawn_blocking(move || {
        catalog.add_to_playlist(&playlist_id, req.media_id.trim())
    })
    .await??
    .ok_or_else(|| ApiError::not_found("Playlist or media not found"))?;
    Ok(Json(json!({ "success": true, "item": item })))
}

pub(crate) async fn get_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let catalog = state.catalog.clone();
    let (playlist, items) = tokio::task::spawn_blocking(move || catalog.playlist_with_items(&playlist_id))
        .await??
        .ok_or_else(|| ApiError::not_found("Playlist not found"))?;
    Ok(Json(json!({ "success": true, "playlist": playlist, "items": items })))
}

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::download::DownloadError;
use crate::extractor::formats::InfoSummary;
use crate::web::error::ApiError;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct InfoQuery {
    pub(crate) url: Option<String>,
}

pub(crate) async fn api_video_info(
    State(state): State<AppState>,
    Query(q): Query<InfoQuery>,
) -> Result<Json<InfoSummary>, ApiError> {
    let url = q.url.unwrap_or_default().trim().to_string();
    if url.is_empty() {
        return Err(ApiError::bad_request("URL parameter is required"));
    }

    let downloader = state.downloader.clone();
    match tokio::task::spawn_blocking(move || downloader.probe(&url)).await? {
        Ok(summary) => Ok(Json(summary)),
        // Resolution failures surface the extractor's own reason.
        Err(DownloadError::Upstream { message }) => Err(ApiError::internal(message)),
        Err(e) => Err(e.into()),
    }
}

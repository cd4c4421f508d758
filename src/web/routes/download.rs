use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use tracing::warn;

use crate::download::{DownloadOutcome, DownloadRequest};
use crate::web::error::ApiError;
use crate::web::state::AppState;

pub(crate) async fn api_download(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DownloadOutcome>, ApiError> {
    // An empty body is an empty request; validation reports the missing url.
    let req: DownloadRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DownloadRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            warn!(target: "web", error = %e, "invalid download request body");
            ApiError::bad_request("Invalid JSON body").with_message(e.to_string())
        })?
    };

    let downloader = state.downloader.clone();
    let outcome = tokio::task::spawn_blocking(move || downloader.run(req)).await??;
    Ok(Json(outcome))
}

use axum::Router;
use axum::extract::State;
use axum::extract::connect_info::ConnectInfo;
use axum::http::Request;
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use tracing::{info, warn};

use super::error::ApiError;
use super::routes;
use super::state::AppState;

pub(crate) fn build_router(state: AppState) -> Router {
    // 仅下载接口受全局限流保护
    let guarded = Router::new()
        .route("/api/download", post(routes::download::api_download))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_mw));

    Router::new()
        .route("/api/status", get(routes::status::api_status))
        .route("/api/video-info", get(routes::info::api_video_info))
        .route("/api/media-library", get(routes::library::api_library))
        .route("/api/media/:id", delete(routes::library::api_delete_media))
        .route("/api/cleanup", post(routes::library::api_cleanup))
        .route("/api/playlists", post(routes::playlists::create_playlist))
        .route("/api/playlists/:id", get(routes::playlists::get_playlist))
        .route(
            "/api/playlists/:id/items",
            post(routes::playlists::add_playlist_item),
        )
        .route("/media/:id", get(routes::media::stream_media))
        .route("/download/:id", get(routes::media::download_media))
        .merge(guarded)
        .layer(from_fn(access_log_mw))
        .with_state(state)
}

async fn rate_limit_mw(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if let Err(e) = state.limiter.check() {
        warn!(target: "web", limit = e.limit, per_secs = e.per_secs, "download rate limit hit");
        return ApiError::from(e).into_response();
    }
    next.run(req).await
}

async fn access_log_mw(req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    let ip = req
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|c| c.0)
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let resp = next.run(req).await;
    info!(target: "web_access", ip = %ip, method = %method, path = %path, status = %resp.status().as_u16(), "ok");
    resp
}

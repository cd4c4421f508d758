use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::web::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) async fn api_status(State(state): State<AppState>) -> Json<Value> {
    let binds: Vec<String> = state.bind_addrs.iter().map(|a| a.to_string()).collect();
    Json(json!({
        "version": VERSION,
        "bind_addrs": binds,
        "storage_root": state.layout.root.to_string_lossy(),
        "rate_limit": {
            "limit": state.limiter.limit(),
            "per_secs": state.limiter.per().as_secs(),
        },
        "retention": {
            "max_file_age_hours": state.config.max_file_age_hours,
            "sweep_interval_secs": state.config.sweep_interval_secs,
        }
    }))
}

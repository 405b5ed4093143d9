use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe, returns server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cameras = state.store.lock().map(|store| store.len()).unwrap_or(0);
    Json(json!({
        "status": "ok",
        "version": env!("TIMELAPSE_BUILD_VERSION"),
        "cameras": cameras,
    }))
}

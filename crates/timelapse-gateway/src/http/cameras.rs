//! Camera ingestion and status endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, MutexGuard};
use timelapse_core::TimelapseError;
use timelapse_scheduler::schedule::check_fixed_window;
use timelapse_scheduler::CameraDefinition;
use tracing::{error, info, warn};
use url::Url;

use crate::app::AppState;
use crate::fleet::CameraStatus;
use crate::store::{CameraStore, StoredCamera};

type ApiError = (StatusCode, Json<Value>);

/// Body of `POST /cameras`: the persisted layout plus the camera name.
#[derive(Debug, Deserialize)]
pub struct CreateCamera {
    pub name: String,
    #[serde(flatten)]
    pub camera: StoredCamera,
}

/// GET /cameras
pub async fn list_cameras(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let store = lock_store(&state)?;
    let cameras: Vec<Value> = store
        .list()
        .map(|(name, camera)| camera_json(name, camera, state.fleet.status(name)))
        .collect();
    Ok(Json(json!({ "cameras": cameras })))
}

/// GET /cameras/{name}
pub async fn get_camera(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let store = lock_store(&state)?;
    let camera = store.get(&name).ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            &TimelapseError::CameraNotFound { name: name.clone() },
        )
    })?;
    Ok(Json(camera_json(&name, camera, state.fleet.status(&name))))
}

/// POST /cameras
///
/// Validates, appends to the store, saves, then launches the camera's
/// driver. 400 on an invalid definition, 409 when the name is taken.
pub async fn create_camera(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateCamera>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = body.map_err(|e| {
        warn!(error = %e, "rejected camera body");
        error_response(
            StatusCode::BAD_REQUEST,
            &TimelapseError::InvalidCamera(e.body_text()),
        )
    })?;
    let definition = validate(&req).map_err(|reason| {
        warn!(camera = %req.name, %reason, "rejected camera definition");
        error_response(
            StatusCode::BAD_REQUEST,
            &TimelapseError::InvalidCamera(reason),
        )
    })?;
    let name = definition.name.clone();

    {
        let mut store = lock_store(&state)?;
        store
            .append(&name, req.camera.clone())
            .map_err(|e| error_response(StatusCode::CONFLICT, &e))?;
        if let Err(e) = store.save() {
            error!(camera = %name, error = %e, "failed to save camera store");
            let _ = store.remove(&name);
            return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, &e));
        }
    }

    state.fleet.launch(definition).await;
    info!(camera = %name, "camera added");
    Ok((
        StatusCode::CREATED,
        Json(camera_json(&name, &req.camera, state.fleet.status(&name))),
    ))
}

fn validate(req: &CreateCamera) -> Result<CameraDefinition, String> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    let camera = &req.camera;
    if camera.folder_path.trim().is_empty() {
        return Err("folder_path must not be empty".to_string());
    }
    let url = Url::parse(&camera.url).map_err(|e| format!("bad url {:?}: {e}", camera.url))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("url must be http(s): {:?}", camera.url));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("url has no host: {:?}", camera.url));
    }
    if !(-90.0..=90.0).contains(&camera.latitude) {
        return Err(format!("latitude {} is outside ±90", camera.latitude));
    }
    if !(-180.0..=180.0).contains(&camera.longitude) {
        return Err(format!("longitude {} is outside ±180", camera.longitude));
    }
    let definition = camera.to_definition(name).map_err(|e| e.to_string())?;
    check_fixed_window(&definition).map_err(|e| e.to_string())?;
    Ok(definition)
}

fn camera_json(name: &str, camera: &StoredCamera, status: Option<CameraStatus>) -> Value {
    json!({
        "name": name,
        "definition": camera,
        "status": status,
    })
}

fn lock_store(state: &AppState) -> Result<MutexGuard<'_, CameraStore>, ApiError> {
    state.store.lock().map_err(|_| {
        error!("camera store lock poisoned");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "camera store unavailable" })),
        )
    })
}

fn error_response(status: StatusCode, e: &TimelapseError) -> ApiError {
    (
        status,
        Json(json!({ "error": e.to_string(), "code": e.code() })),
    )
}

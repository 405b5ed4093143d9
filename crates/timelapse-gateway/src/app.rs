use std::sync::{Arc, Mutex};

use axum::{routing::get, Router};

use crate::fleet::Fleet;
use crate::store::CameraStore;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    /// std Mutex: handlers never hold it across an await.
    pub store: Mutex<CameraStore>,
    pub fleet: Fleet,
}

impl AppState {
    pub fn new(store: CameraStore, fleet: Fleet) -> Self {
        Self {
            store: Mutex::new(store),
            fleet,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/cameras",
            get(crate::http::cameras::list_cameras).post(crate::http::cameras::create_camera),
        )
        .route("/cameras/{name}", get(crate::http::cameras::get_camera))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

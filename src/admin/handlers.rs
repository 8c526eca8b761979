//! Admin route handlers.
//!
//! Each handler is a thin wrapper over the router's admin methods; the
//! interesting behavior lives in the executor. Responses are plain JSON
//! acknowledgements so the CLI can print them verbatim.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::executor::RouterStatus;
use crate::http::server::AppState;

/// GET /admin/status
pub async fn get_status(State(state): State<AppState>) -> Json<RouterStatus> {
    Json(state.inner.load().router.status())
}

/// POST /admin/cache/clear
pub async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    state.inner.load().router.clear_cache();
    info!("Admin cleared the response cache");
    Json(json!({ "cleared": true }))
}

/// POST /admin/endpoints/{id}/reset
pub async fn reset_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.inner.load().router.reset_endpoint(&id) {
        info!(endpoint = %id, "Admin reset endpoint");
        Json(json!({ "reset": id })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown endpoint: {id}") })),
        )
            .into_response()
    }
}

/// POST /admin/disable
pub async fn disable_router(State(state): State<AppState>) -> Json<Value> {
    state.inner.load().router.disable();
    info!("Admin disabled the resilience layer, requests now pass straight through");
    Json(json!({ "disabled": true }))
}

/// POST /admin/enable
pub async fn enable_router(State(state): State<AppState>) -> Json<Value> {
    state.inner.load().router.enable();
    info!("Admin re-enabled the resilience layer");
    Json(json!({ "disabled": false }))
}

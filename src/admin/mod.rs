//! Administrative HTTP surface.
//!
//! Mounted by the gateway when `admin.enabled` is set. Every route sits
//! behind bearer-key auth; the handlers act on the router generation
//! current at request time.

pub mod auth;
pub mod handlers;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::http::server::AppState;

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(handlers::get_status))
        .route("/admin/cache/clear", post(handlers::clear_cache))
        .route("/admin/endpoints/{id}/reset", post(handlers::reset_endpoint))
        .route("/admin/disable", post(handlers::disable_router))
        .route("/admin/enable", post(handlers::enable_router))
        .layer(middleware::from_fn_with_state(state.clone(), auth::admin_auth))
        .with_state(state)
}

//! Gateway server setup.
//!
//! # Responsibilities
//! - Build the Axum router with the execute and liveness handlers
//! - Stack the middleware layers (request id, tracing, timeout, body limit)
//! - Serve with graceful shutdown
//!
//! # Design Decisions
//! - Handlers read the current generation through an ArcSwap. A
//!   configuration reload builds a fresh [`GatewayInner`] and swaps it
//!   in; requests already holding the old generation finish on it.
//! - The response envelope always rides HTTP 200. A degraded result is
//!   a successful outcome of the pipeline, not a transport error, and
//!   callers distinguish it via the `status` field.
//! - Rate-limit headers are advisory. They reflect the local budget at
//!   response time and may race with concurrent requests.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::admin;
use crate::config::RouterConfig;
use crate::executor::{ResilienceRouter, ResponseStatus, RouterError};
use crate::transport::HttpTransport;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Everything one configuration generation owns: the parsed config and
/// the resilience pipeline built from it.
pub struct GatewayInner {
    pub config: RouterConfig,
    pub router: ResilienceRouter<HttpTransport>,
}

impl GatewayInner {
    pub fn new(config: RouterConfig, transport: Arc<HttpTransport>) -> Self {
        let router = ResilienceRouter::from_config(&config, transport);
        Self { config, router }
    }
}

/// Shared application state. Cloning is cheap; the ArcSwap is the one
/// mutable cell, replaced wholesale on configuration reload.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<GatewayInner>>,
}

impl AppState {
    pub fn new(inner: GatewayInner) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(inner)),
        }
    }

    /// Install a freshly built generation.
    pub fn swap(&self, inner: GatewayInner) {
        self.inner.store(Arc::new(inner));
    }
}

/// Stamps `x-request-id` with a UUID v4. Applied outside the trace
/// layer so access logs carry the id.
#[derive(Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Body of `POST /v1/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub operation: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub endpoint: String,
}

/// Build the public router, with the admin surface merged in when the
/// configuration enables it.
pub fn build_router(state: AppState) -> Router {
    let (request_timeout, admin_enabled) = {
        let inner = state.inner.load();
        (
            Duration::from_secs(inner.config.server.request_timeout_secs),
            inner.config.admin.enabled,
        )
    };

    let mut app = Router::new()
        .route("/v1/execute", post(execute_handler))
        .route("/health", get(health_handler))
        .with_state(state.clone());

    if admin_enabled {
        app = app.merge(admin::admin_router(state));
    }

    app.layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

async fn execute_handler(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Response {
    // Hold the generation for the whole request so a mid-flight reload
    // cannot split it across two pipelines.
    let inner = state.inner.load_full();

    match inner
        .router
        .execute(&body.operation, &body.params, &body.endpoint)
        .await
    {
        Ok(envelope) => {
            let degraded = envelope.status == ResponseStatus::Degraded;
            let mut response = Json(&envelope).into_response();
            let headers = response.headers_mut();

            if let Some((limit, remaining)) = inner.router.rate_budget_view(&body.endpoint) {
                headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            }
            if degraded {
                if let Some(after) = inner.router.rate_retry_after(&body.endpoint) {
                    let secs = after.as_secs().max(1);
                    headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
                }
            }

            response
        }
        Err(RouterError::UnknownEndpoint(id)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown endpoint: {id}") })),
        )
            .into_response(),
    }
}

/// Gateway liveness. Never touches upstreams; endpoint health lives
/// under `/admin/status`.
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// The gateway's HTTP front end.
pub struct GatewayServer {
    app: Router,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            app: build_router(state),
        }
    }

    /// Serve until the shutdown channel fires, then drain in-flight
    /// requests before returning.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        info!(address = %addr, "Gateway listening");

        axum::serve(listener, self.app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("Shutdown signal received, draining connections");
            })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

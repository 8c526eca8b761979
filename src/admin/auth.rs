//! Bearer-key authentication for the admin surface.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::http::server::AppState;

/// Rejects requests whose `Authorization` header does not carry the
/// configured admin key. The comparison is against the full
/// `Bearer <key>` string so an empty configured key still requires the
/// scheme prefix.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = format!("Bearer {}", state.inner.load().config.admin.api_key);

    let authorized = request
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);

    if authorized {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

//! Fetch interception entry point.

use crate::error::ProxyError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http;
use axum::response::{IntoResponse, Response};

/// Largest request body buffered for forwarding.
pub const MAX_FORWARD_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Fallback handler: every request outside the reserved prefix is intercepted.
pub async fn intercept(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_FORWARD_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return ProxyError::InvalidRequest(format!("unreadable request body: {e}"))
                .into_response();
        }
    };

    state
        .controller
        .handle(http::Request::from_parts(parts, body))
        .await
}

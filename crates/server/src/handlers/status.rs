//! Health and status endpoints under the reserved prefix.

use crate::controller::ControllerStatus;
use crate::error::ProxyResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /_pantry/health
///
/// Reports liveness only; the proxy is healthy even before activation.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub controller: ControllerStatus,
    /// The origin requests are intercepted for.
    pub origin: String,
    /// Datastore backend name.
    pub backend: &'static str,
    /// Number of cached entries.
    pub cached_entries: usize,
}

/// GET /_pantry/status
pub async fn get_status(State(state): State<AppState>) -> ProxyResult<Json<StatusResponse>> {
    let controller = &state.controller;
    let cache = controller.cache();
    let cached_entries = if cache.is_open() { cache.len().await? } else { 0 };

    Ok(Json(StatusResponse {
        controller: controller.status().await,
        origin: controller.origin().to_string(),
        backend: cache.datastore().backend_name(),
        cached_entries,
    }))
}

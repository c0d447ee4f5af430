//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Path prefix reserved for the proxy's own endpoints. Never intercepted.
pub const RESERVED_PREFIX: &str = "/_pantry";

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut reserved = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::get_status))
        .fallback(|| async { StatusCode::NOT_FOUND });

    // SECURITY: when enabled, restrict this endpoint to scrapers at the network level.
    if state.config.server.metrics_enabled {
        reserved = reserved.route("/metrics", get(metrics_handler));
    }

    Router::new()
        .nest(RESERVED_PREFIX, reserved)
        // Everything else is an intercepted fetch
        .fallback(handlers::intercept)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Proxy error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Failure of a single retrieval, delivered through a transfer queue or
/// returned by a retrieval client that rejects a request outright.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    #[error("no provider configured")]
    NoProvider,

    #[error("provider rejected request with status {status}")]
    Rejected { status: u16 },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("content does not match {0}")]
    Verification(String),

    #[error("transfer exceeded expected size of {limit} bytes")]
    SizeExceeded { limit: u64 },
}

/// Proxy error type.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error("configuration load failed: {0}")]
    ConfigLoadFailed(String),

    #[error("retrieval client construction failed: {0}")]
    ClientBuild(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("no upstream configured for {0}")]
    NoUpstream(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("request to {0} looped back to this proxy")]
    LoopDetected(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] pantry_storage::StorageError),

    #[error("core error: {0}")]
    Core(#[from] pantry_core::Error),
}

impl ProxyError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransferFailed(_) => "transfer_failed",
            Self::ConfigLoadFailed(_) => "config_load_failed",
            Self::ClientBuild(_) => "client_build_failed",
            Self::Lifecycle(_) => "lifecycle_error",
            Self::NoUpstream(_) => "no_upstream",
            Self::Upstream(_) => "upstream_error",
            Self::LoopDetected(_) => "loop_detected",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Storage(_) => "storage_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TransferFailed(_) => StatusCode::BAD_GATEWAY,
            Self::ConfigLoadFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ClientBuild(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Lifecycle(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoUpstream(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::LoopDetected(_) => StatusCode::LOOP_DETECTED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(e) => match e {
                pantry_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_failures_map_to_bad_gateway() {
        let err = ProxyError::from(TransferError::Rejected { status: 404 });
        assert_eq!(err.code(), "transfer_failed");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_storage_not_found_maps_to_404() {
        let err = ProxyError::from(pantry_storage::StorageError::NotFound("k".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err = ProxyError::from(pantry_storage::StorageError::StoreNotOpen("ns".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_loop_maps_to_508() {
        let err = ProxyError::LoopDetected("http://localhost:8480/".to_string());
        assert_eq!(err.code(), "loop_detected");
        assert_eq!(err.status_code(), StatusCode::LOOP_DETECTED);
    }
}

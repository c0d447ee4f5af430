//! Prometheus metrics for the Pantry proxy.
//!
//! Counters cover how intercepted requests were answered. No identifiers or
//! paths are recorded as labels.
//!
//! The `/_pantry/metrics` endpoint is unauthenticated; restrict it at the
//! network level when the proxy listens beyond localhost.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Request outcome metrics
pub static CACHE_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "pantry_cache_hits_total",
        "Total number of requests answered from the content cache",
    )
    .expect("metric creation failed")
});

pub static CACHE_MISSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "pantry_cache_misses_total",
        "Total number of content requests not found in the cache",
    )
    .expect("metric creation failed")
});

pub static RETRIEVALS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "pantry_retrievals_completed_total",
        "Total number of retrievals streamed to completion",
    )
    .expect("metric creation failed")
});

pub static RETRIEVAL_FALLBACKS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pantry_retrieval_fallbacks_total",
            "Total number of requests answered by the network after retrieval failed",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static PASSTHROUGH_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pantry_passthrough_requests_total",
            "Total number of requests forwarded without interception",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static BYTES_RETRIEVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "pantry_bytes_retrieved_total",
        "Total bytes streamed from providers",
    )
    .expect("metric creation failed")
});

pub static BYTES_SERVED_FROM_CACHE: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "pantry_bytes_served_from_cache_total",
        "Total bytes served from the content cache",
    )
    .expect("metric creation failed")
});

pub static CACHE_WRITE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "pantry_cache_write_failures_total",
        "Total number of completed retrievals that could not be cached",
    )
    .expect("metric creation failed")
});

// Lifecycle metrics
pub static WORKER_GENERATION: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "pantry_worker_generation",
        "Generation number of the active worker context",
    )
    .expect("metric creation failed")
});

pub static INSTALL_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "pantry_install_failures_total",
        "Total number of failed install attempts",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(CACHE_HITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_MISSES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVALS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVAL_FALLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PASSTHROUGH_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RETRIEVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_SERVED_FROM_CACHE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CACHE_WRITE_FAILURES.clone()))
            .expect("metric registration failed");

        // Lifecycle metrics
        REGISTRY
            .register(Box::new(WORKER_GENERATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INSTALL_FAILURES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /_pantry/metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a network fallback after a failed retrieval.
pub fn record_fallback(reason: &str) {
    RETRIEVAL_FALLBACKS.with_label_values(&[reason]).inc();
}

/// Record a request forwarded without interception.
pub fn record_passthrough(reason: &str) {
    PASSTHROUGH_REQUESTS.with_label_values(&[reason]).inc();
}

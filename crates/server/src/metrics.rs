//! Prometheus metrics for the STOW ingest service.
//!
//! Exposes counters for requests, stored and rejected instances, spooled
//! bulk data, and request latency.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no patient or study identifiers, only aggregate counts.
//! Restrict the endpoint to the scraper network at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static STOW_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stow_requests_total",
            "Total STOW requests by input mode and outcome",
        ),
        &["mode", "outcome"],
    )
    .expect("metric creation failed")
});

pub static INSTANCES_STORED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stow_instances_stored_total",
            "Total instances persisted by input mode",
        ),
        &["mode"],
    )
    .expect("metric creation failed")
});

pub static INSTANCES_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stow_instances_failed_total",
            "Total instances rejected by failure reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static BULKDATA_BYTES_SPOOLED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stow_bulkdata_bytes_spooled_total",
        "Total bytes of bulk data written to the spool",
    )
    .expect("metric creation failed")
});

pub static STOW_REQUEST_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stow_request_duration_seconds",
            "Time taken to process a STOW request",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
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
            .register(Box::new(STOW_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INSTANCES_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INSTANCES_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BULKDATA_BYTES_SPOOLED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(STOW_REQUEST_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
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

/// Record a rejected instance under its failure reason label.
pub fn record_instance_failure(code: u16) {
    INSTANCES_FAILED
        .with_label_values(&[stow_core::status::reason_label(code)])
        .inc();
}

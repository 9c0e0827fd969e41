//! Prometheus metrics for the bundler server.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Labels carry outcomes and kinds only, never app or submission ids. Keep
//! the endpoint network-restricted to the scraper all the same.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static PUSHES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("bundler_pushes_total", "Push requests by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static PULLS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("bundler_pulls_total", "Pull requests by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static SUBMITS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("bundler_submits_total", "Submit requests by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static FILES_APPLIED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bundler_files_applied_total",
            "Directory changes applied by pushes (added, changed, removed)",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static BLOBS_PROTECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bundler_blobs_protected_total",
        "Removed names whose blob was kept because another name shares its hash",
    )
    .expect("metric creation failed")
});

pub static FOOTER_BUILD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "bundler_footer_build_duration_seconds",
            "Time spent in the bundle footer builder",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric creation failed")
});

pub static NOTIFICATIONS_DROPPED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bundler_notifications_dropped_total",
        "App update notifications dropped because the queue was full",
    )
    .expect("metric creation failed")
});

pub static NOTIFICATIONS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bundler_notifications_failed_total",
        "App update notifications the webhook did not accept",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PUSHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PULLS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SUBMITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FILES_APPLIED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOBS_PROTECTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FOOTER_BUILD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(NOTIFICATIONS_DROPPED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(NOTIFICATIONS_FAILED.clone()))
            .expect("metric registration failed");
    });
}

/// Handler for `/metrics`.
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

pub fn record_push(outcome: &str) {
    PUSHES.with_label_values(&[outcome]).inc();
}

pub fn record_pull(outcome: &str) {
    PULLS.with_label_values(&[outcome]).inc();
}

pub fn record_submit(outcome: &str) {
    SUBMITS.with_label_values(&[outcome]).inc();
}

pub fn record_files_applied(kind: &str, count: usize) {
    FILES_APPLIED.with_label_values(&[kind]).inc_by(count as u64);
}

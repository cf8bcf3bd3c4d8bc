//! Prometheus metrics registry and instruments.
//!
//! Instruments are usable before `init_metrics` runs; registration only
//! makes them visible to `gather`.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Once;
use std::time::Duration;

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Sync Metrics
    pub static ref SYNC_JOBS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogmirror_sync_jobs_total", "Total number of sync jobs by outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref SYNC_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "blogmirror_sync_duration_seconds",
            "Duration of sync jobs that acquired the blog mutex"
        ).buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref SYNC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogmirror_sync_requests_total", "Total number of sync requests by result"),
        &["result"]
    ).expect("metric can be created");
    pub static ref POSTS_MERGED_TOTAL: IntCounter = IntCounter::new(
        "blogmirror_posts_merged_total",
        "Total number of posts upserted by the merge engine"
    ).expect("metric can be created");
    pub static ref SYNC_QUEUE_DEPTH: IntGauge = IntGauge::new(
        "blogmirror_sync_queue_depth",
        "Sync requests waiting for a worker"
    ).expect("metric can be created");

    // Upstream Metrics
    pub static ref UPSTREAM_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogmirror_upstream_requests_total", "Total number of Tumblr API requests"),
        &["endpoint", "status"]
    ).expect("metric can be created");
}

static INIT: Once = Once::new();

/// Initialize metrics registry.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(SYNC_JOBS_TOTAL.clone()))
            .expect("SYNC_JOBS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SYNC_DURATION_SECONDS.clone()))
            .expect("SYNC_DURATION_SECONDS can be registered");
        REGISTRY
            .register(Box::new(SYNC_REQUESTS_TOTAL.clone()))
            .expect("SYNC_REQUESTS_TOTAL can be registered");
        REGISTRY
            .register(Box::new(POSTS_MERGED_TOTAL.clone()))
            .expect("POSTS_MERGED_TOTAL can be registered");
        REGISTRY
            .register(Box::new(SYNC_QUEUE_DEPTH.clone()))
            .expect("SYNC_QUEUE_DEPTH can be registered");
        REGISTRY
            .register(Box::new(UPSTREAM_REQUESTS_TOTAL.clone()))
            .expect("UPSTREAM_REQUESTS_TOTAL can be registered");

        tracing::info!("Metrics registry initialized");
    });
}

/// Record a finished sync job.
pub fn observe_sync(outcome: &str, elapsed: Duration) {
    SYNC_JOBS_TOTAL.with_label_values(&[outcome]).inc();
    SYNC_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(%error, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::time::Duration;

use crate::jobs::{QueueStats, ReclaimReport};

/// Metric name prefix for all analysis server metrics
const PREFIX: &str = "mixgauge";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Job lifecycle metrics
    pub static ref JOBS_SUBMITTED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_jobs_submitted_total"),
        "Total jobs accepted at the submission boundary"
    ).expect("Failed to create jobs_submitted_total metric");

    pub static ref JOBS_COMPLETED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_jobs_completed_total"),
        "Total jobs finished with a score report"
    ).expect("Failed to create jobs_completed_total metric");

    pub static ref JOBS_FAILED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_failed_total"), "Total jobs that ended in a failure state"),
        &["kind"]
    ).expect("Failed to create jobs_failed_total metric");

    pub static ref JOBS_RECLAIMED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_reclaimed_total"), "Orphaned jobs handled by the sweeper"),
        &["action"]
    ).expect("Failed to create jobs_reclaimed_total metric");

    pub static ref QUEUE_DEPTH: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_queue_depth"), "Jobs per lifecycle status"),
        &["status"]
    ).expect("Failed to create queue_depth metric");

    pub static ref ANALYSIS_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_analysis_duration_seconds"),
            "Wall time from claim to terminal state"
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0])
    ).expect("Failed to create analysis_duration_seconds metric");

    // Transition guard violations indicate a broken concurrency contract
    pub static ref TRANSITION_CONFLICTS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_transition_conflicts_total"),
        "Guarded status transitions refused by the store"
    ).expect("Failed to create transition_conflicts_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(JOBS_SUBMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_COMPLETED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_FAILED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_RECLAIMED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_DEPTH.clone()));
    let _ = REGISTRY.register(Box::new(ANALYSIS_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TRANSITION_CONFLICTS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_job_submitted() {
    JOBS_SUBMITTED_TOTAL.inc();
}

pub fn record_job_completed(duration: Duration) {
    JOBS_COMPLETED_TOTAL.inc();
    ANALYSIS_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_job_failed(kind: &str, duration: Duration) {
    JOBS_FAILED_TOTAL.with_label_values(&[kind]).inc();
    ANALYSIS_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_transition_conflict() {
    TRANSITION_CONFLICTS_TOTAL.inc();
}

pub fn record_reclaim(report: &ReclaimReport) {
    JOBS_RECLAIMED_TOTAL
        .with_label_values(&["requeued"])
        .inc_by(report.requeued as f64);
    JOBS_RECLAIMED_TOTAL
        .with_label_values(&["abandoned"])
        .inc_by(report.abandoned as f64);
}

pub fn set_queue_depth(stats: &QueueStats) {
    QUEUE_DEPTH
        .with_label_values(&["queued"])
        .set(stats.queued as f64);
    QUEUE_DEPTH
        .with_label_values(&["processing"])
        .set(stats.processing as f64);
    QUEUE_DEPTH
        .with_label_values(&["done"])
        .set(stats.done as f64);
    QUEUE_DEPTH
        .with_label_values(&["failed"])
        .set(stats.failed as f64);
}

/// GET /metrics handler for Prometheus scraping
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response()
        }
    }
}

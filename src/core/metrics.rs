//! Pipeline metrics using Prometheus
//!
//! Tracks:
//! - Requests by retrieval strategy
//! - Transcode plans chosen
//! - Failures by error kind
//! - Time spent in each pipeline stage

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder};

/// Pipeline requests by retrieval strategy
/// Labels: strategy (generic-extractor / direct-api:tiktok)
#[allow(clippy::unwrap_used)]
pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reelpipe_requests_total",
        "Total number of pipeline requests by retrieval strategy",
        &["strategy"]
    )
    .unwrap()
});

/// Transcode plans by variant
/// Labels: plan (copy_remux / audio_extract / recode)
#[allow(clippy::unwrap_used)]
pub static TRANSCODE_PLANS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reelpipe_transcode_plans_total",
        "Total number of transcode plans by variant",
        &["plan"]
    )
    .unwrap()
});

/// Failed requests
/// Labels: kind (see PipelineError::kind)
#[allow(clippy::unwrap_used)]
pub static FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("reelpipe_failures_total", "Total number of failed requests by kind", &["kind"]).unwrap()
});

/// Stage durations in seconds
/// Labels: stage (extract / transcode / total)
#[allow(clippy::unwrap_used)]
pub static STAGE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reelpipe_stage_duration_seconds",
        "Time spent per pipeline stage",
        &["stage"],
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]
    )
    .unwrap()
});

/// Force-registers every metric so they show up in exports before first use.
pub fn init_metrics() {
    Lazy::force(&REQUESTS_TOTAL);
    Lazy::force(&TRANSCODE_PLANS_TOTAL);
    Lazy::force(&FAILURES_TOTAL);
    Lazy::force(&STAGE_DURATION_SECONDS);
    log::debug!("Metrics registered");
}

pub fn record_request(strategy: &str) {
    REQUESTS_TOTAL.with_label_values(&[strategy]).inc();
}

pub fn record_plan(plan: &str) {
    TRANSCODE_PLANS_TOTAL.with_label_values(&[plan]).inc();
}

pub fn record_failure(kind: &str) {
    FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_stage(stage: &str, seconds: f64) {
    STAGE_DURATION_SECONDS.with_label_values(&[stage]).observe(seconds);
}

/// Renders the default registry in the Prometheus text format.
pub fn gather_text() -> String {
    TextEncoder::new()
        .encode_to_string(&prometheus::gather())
        .unwrap_or_else(|e| format!("# failed to encode metrics: {}\n", e))
}

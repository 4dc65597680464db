//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CLAIMED_TOTAL: &str = "vconv_jobs_claimed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vconv_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vconv_jobs_failed_total";
    pub const TRANSCODE_DURATION_SECONDS: &str = "vconv_transcode_duration_seconds";
    pub const CLAIM_ERRORS_TOTAL: &str = "vconv_claim_errors_total";
}

/// Install the Prometheus recorder with an HTTP scrape listener on `port`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_claimed() {
    counter!(names::JOBS_CLAIMED_TOTAL).increment(1);
}

pub fn record_job_completed(preset: &str) {
    let labels = [("preset", preset.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record wall time of one supervised transcode.
pub fn record_transcode_duration(preset: &str, duration_secs: f64) {
    let labels = [("preset", preset.to_string())];
    histogram!(names::TRANSCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_claim_error() {
    counter!(names::CLAIM_ERRORS_TOTAL).increment(1);
}

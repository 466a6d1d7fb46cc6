//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use vforge_queue::ReapReport;

/// Install the Prometheus recorder with an HTTP scrape listener on `port`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Job lifecycle
    pub const JOBS_CLAIMED_TOTAL: &str = "vforge_jobs_claimed_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vforge_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vforge_jobs_failed_total";
    pub const RECORDS_DISCARDED_TOTAL: &str = "vforge_records_discarded_total";

    // Lease reaper
    pub const JOBS_REQUEUED_TOTAL: &str = "vforge_jobs_requeued_total";
    pub const JOBS_EXPIRED_TOTAL: &str = "vforge_jobs_expired_total";

    // Processing
    pub const FFMPEG_DURATION_SECONDS: &str = "vforge_ffmpeg_duration_seconds";
}

/// Record a claimed job.
pub fn record_job_claimed(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!(names::JOBS_CLAIMED_TOTAL, &labels).increment(1);
}

/// Record a job finalized as completed.
pub fn record_job_completed(operation: &str) {
    let labels = [("operation", operation.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

/// Record a job finalized as failed.
pub fn record_job_failed(operation: &str, reason: &str) {
    let labels = [
        ("operation", operation.to_string()),
        ("reason", reason.to_string()),
    ];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record a claimed record that could not be parsed.
pub fn record_discarded() {
    counter!(names::RECORDS_DISCARDED_TOTAL).increment(1);
}

/// Record the outcome of a reaper pass.
pub fn record_reap(report: &ReapReport) {
    counter!(names::JOBS_REQUEUED_TOTAL).increment(report.requeued.len() as u64);
    counter!(names::JOBS_EXPIRED_TOTAL).increment(report.failed.len() as u64);
    counter!(names::RECORDS_DISCARDED_TOTAL).increment(report.discarded.len() as u64);
}

/// Record FFmpeg processing duration.
pub fn record_ffmpeg_duration(operation: &str, duration_secs: f64) {
    let labels = [("operation", operation.to_string())];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}

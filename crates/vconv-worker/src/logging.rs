//! Tracing setup and per-job structured logging.

use std::time::Duration;

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vconv_models::{Job, JobId};

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, otherwise
/// human-readable ANSI output. `RUST_LOG` directives are honored on top of
/// the `vconv=info` default.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = match "vconv=info".parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Per-job event logger.
///
/// Every event carries the job id and the operation name so a job can be
/// followed across claim, transcode and finalization.
#[derive(Debug, Clone, Copy)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: JobId, operation: &'static str) -> Self {
        Self { job_id, operation }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn claimed(&self, job: &Job) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            preset = %job.preset,
            input_key = %job.input_key,
            input_bytes = job.input_size_bytes,
            "Job claimed"
        );
    }

    pub fn remote_input(&self, url: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            url = %url,
            "Streaming input from pointer URL"
        );
    }

    pub fn progress(&self, percent: u8) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            percent,
            "Transcode progress"
        );
    }

    pub fn warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            "{}", message
        );
    }

    pub fn failed(&self, error: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            error = %error,
            "Job failed"
        );
    }

    pub fn completed(&self, output_key: &str, bytes: u64, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            output_key = %output_key,
            bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            "Job done"
        );
    }

    /// Span the executor runs the whole job inside.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(job_id, "transcode");

        assert_eq!(logger.job_id(), job_id);
        assert_eq!(logger.operation(), "transcode");
    }
}

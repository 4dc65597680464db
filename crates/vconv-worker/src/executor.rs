//! Job executor: the polling worker loop.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use vconv_models::{Job, JobId, JobStatus};
use vconv_queue::JobStore;
use vconv_storage::BlobStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::supervisor::TranscodeSupervisor;

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No queued job
    Idle,
    /// A job was claimed and finalized with this status
    Processed { job_id: JobId, status: JobStatus },
}

/// Claims jobs one at a time and runs each to a terminal state.
///
/// Many executors (processes or machines) may poll the same store; the
/// store's claim guarantees each job goes to exactly one of them.
pub struct JobExecutor {
    config: WorkerConfig,
    jobs: Arc<dyn JobStore>,
    supervisor: TranscodeSupervisor,
    shutdown: watch::Sender<bool>,
    worker_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, jobs: Arc<dyn JobStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let supervisor = TranscodeSupervisor::new(&config, Arc::clone(&jobs), blobs);
        let (shutdown, _) = watch::channel(false);
        let worker_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            jobs,
            supervisor,
            shutdown,
            worker_name,
        }
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Poll until [`JobExecutor::shutdown`] is called.
    ///
    /// A job in flight when shutdown is requested runs to completion first.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            worker = %self.worker_name,
            poll_interval = ?self.config.poll_interval,
            ffmpeg = %self.supervisor.runner().bin(),
            "Starting job executor"
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let pause = match self.poll_once().await {
                Ok(PollOutcome::Processed { .. }) => continue,
                Ok(PollOutcome::Idle) => self.config.poll_interval,
                Err(e) => {
                    error!(worker = %self.worker_name, "Failed to claim job: {}", e);
                    metrics::record_claim_error();
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(worker = %self.worker_name, "Job executor stopped");
        Ok(())
    }

    /// Claim and process at most one job.
    ///
    /// Only a failed claim is an error; everything that goes wrong after the
    /// claim is recorded on the job.
    pub async fn poll_once(&self) -> WorkerResult<PollOutcome> {
        let Some(job) = self.jobs.claim_next().await? else {
            return Ok(PollOutcome::Idle);
        };

        metrics::record_job_claimed();
        let job_id = job.id;
        let status = self.execute(job).await;
        Ok(PollOutcome::Processed { job_id, status })
    }

    /// Run a claimed job and record its outcome. Returns the status the job
    /// was moved to.
    pub async fn execute(&self, job: Job) -> JobStatus {
        let logger = JobLogger::new(job.id, "transcode");
        let span = logger.span();

        async {
            logger.claimed(&job);

            let started = Instant::now();
            let result = self.supervisor.transcode(&job).await;
            let elapsed = started.elapsed();
            metrics::record_transcode_duration(job.preset.as_str(), elapsed.as_secs_f64());

            match result {
                Ok(output) => match self.jobs.complete(&job.id, &output.output_key).await {
                    Ok(()) => {
                        metrics::record_job_completed(job.preset.as_str());
                        logger.completed(&output.output_key, output.size, elapsed);
                        JobStatus::Done
                    }
                    Err(e) => {
                        let message = format!("exception:QueueError:{}", e);
                        logger.failed(&message);
                        self.record_failure(&job, &message, "exception").await
                    }
                },
                Err(e) => {
                    let message = e.failure_message();
                    logger.failed(&message);
                    self.record_failure(&job, &message, e.failure_reason()).await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn record_failure(&self, job: &Job, message: &str, reason: &str) -> JobStatus {
        metrics::record_job_failed(reason);
        match self.jobs.fail(&job.id, message).await {
            Ok(()) => debug!(job_id = %job.id, error = %message, "Job marked failed"),
            // The row stays `processing`; nothing more can be done from here
            Err(e) => error!(job_id = %job.id, "Failed to record job failure: {}", e),
        }
        JobStatus::Failed
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

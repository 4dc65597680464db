//! Job record store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use vconv_models::{Job, JobId, JobStatus};

use crate::error::{QueueError, QueueResult};

/// Highest progress a job may report while still processing; 100 is
/// reserved for `done`.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Durable, concurrency-safe storage for conversion jobs.
///
/// Status moves strictly `queued -> processing -> done | failed`; every
/// implementation enforces that at the store, not at the caller.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly created job.
    ///
    /// Only a queued job with progress 0 and no output or error is accepted
    /// (see [`check_new_job`]); an id already stored is
    /// [`QueueError::Duplicate`].
    async fn insert(&self, job: &Job) -> QueueResult<()>;

    /// Atomically take the oldest queued job and move it to `processing`
    /// with progress 0 and no error.
    ///
    /// At most one caller ever receives a given job. A row held by another
    /// in-flight claim is skipped, never waited on.
    async fn claim_next(&self) -> QueueResult<Option<Job>>;

    /// Raise progress of a processing job.
    ///
    /// Clamped to [`MAX_RUNNING_PROGRESS`]. Lower values, missing rows and
    /// jobs no longer processing are ignored.
    async fn update_progress(&self, id: &JobId, progress: u8) -> QueueResult<()>;

    /// `processing -> done` with progress 100 and the output key.
    async fn complete(&self, id: &JobId, output_key: &str) -> QueueResult<()>;

    /// `processing -> failed` with a diagnostic.
    async fn fail(&self, id: &JobId, error: &str) -> QueueResult<()>;

    /// Read-only snapshot.
    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>>;

    /// Jobs created before `cutoff`, oldest first.
    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<Job>>;

    /// Remove a job record. A job still `processing` is never removed.
    ///
    /// Returns whether a record was deleted.
    async fn delete(&self, id: &JobId) -> QueueResult<bool>;
}

/// Reject anything [`JobStore::insert`] must not persist.
pub fn check_new_job(job: &Job) -> QueueResult<()> {
    let reason = if job.status != JobStatus::Queued {
        "status is not queued"
    } else if job.progress != 0 {
        "progress is not 0"
    } else if !job.output_key.is_empty() {
        "output key is set"
    } else if !job.error.is_empty() {
        "error is set"
    } else {
        return Ok(());
    };
    Err(QueueError::NotQueued { id: job.id, reason })
}

//! Queue error types.

use thiserror::Error;
use vconv_models::{JobId, JobStatus};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job already exists: {0}")]
    Duplicate(JobId),

    #[error("Job {id} is not a fresh queued job: {reason}")]
    NotQueued { id: JobId, reason: &'static str },

    #[error("Corrupt job record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn invalid_transition(id: JobId, from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition { id, from, to }
    }
}

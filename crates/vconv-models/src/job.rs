//! Conversion job entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{JobStatus, Preset};

/// Blob store namespace for raw inputs.
pub const INPUT_PREFIX: &str = "inputs/";
/// Blob store namespace for produced outputs.
pub const OUTPUT_PREFIX: &str = "outputs/";

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Output key the worker writes to when this job succeeds.
    pub fn output_key(&self) -> String {
        format!("{}{}.mp4", OUTPUT_PREFIX, self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// A conversion job as persisted by the job record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID, immutable
    pub id: JobId,

    /// Lifecycle status
    pub status: JobStatus,

    /// Progress (0-100); 100 only when done
    pub progress: u8,

    /// Output quality preset, immutable
    pub preset: Preset,

    /// Input blob key under `inputs/`
    pub input_key: String,

    /// Best-effort input size, informational only
    pub input_size_bytes: u64,

    /// Empty until done, then `outputs/<id>.mp4`
    #[serde(default)]
    pub output_key: String,

    /// Diagnostic text, set only when failed
    #[serde(default)]
    pub error: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(preset: Preset, input_key: impl Into<String>, input_size_bytes: u64) -> Self {
        let now = Utc::now();

        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            progress: 0,
            preset,
            input_key: input_key.into(),
            input_size_bytes,
            output_key: String::new(),
            error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the cross-field invariants:
    /// `done <=> output_key set <=> progress == 100`, and progress in range.
    pub fn is_consistent(&self) -> bool {
        let done = self.status == JobStatus::Done;
        self.progress <= 100
            && done == !self.output_key.is_empty()
            && done == (self.progress == 100)
            && (self.status == JobStatus::Failed || self.error.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new(Preset::P480, "inputs/abc.mp4", 1024);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.output_key.is_empty());
        assert!(job.error.is_empty());
        assert_eq!(job.created_at, job.updated_at);
        assert!(job.is_consistent());
    }

    #[test]
    fn test_output_key_layout() {
        let id: JobId = "6f1c0c4e-2d55-4d1e-9a57-0d5b0a3f7d11".parse().unwrap();
        assert_eq!(
            id.output_key(),
            "outputs/6f1c0c4e-2d55-4d1e-9a57-0d5b0a3f7d11.mp4"
        );
    }

    #[test]
    fn test_consistency_rejects_half_done() {
        let mut job = Job::new(Preset::Original, "inputs/x", 0);
        job.status = JobStatus::Done;
        job.progress = 100;
        assert!(!job.is_consistent(), "done without output key");

        job.output_key = job.id.output_key();
        assert!(job.is_consistent());

        job.progress = 95;
        assert!(!job.is_consistent(), "done below 100");
    }
}

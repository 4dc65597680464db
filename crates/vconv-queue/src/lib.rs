//! Durable conversion job queue.
//!
//! This crate provides:
//! - The [`JobStore`] contract with skip-locked claim semantics
//! - A PostgreSQL store for multi-process deployments
//! - An in-memory store for single-process use and tests
//! - Job submission: input intake, validation, status and download checks

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod submission;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryJobStore;
pub use postgres::{DatabaseConfig, PgJobStore};
pub use store::{JobStore, MAX_RUNNING_PROGRESS};
pub use submission::{
    DownloadGrant, IntakeLimits, JobStatusView, JobSubmission, SubmissionError, SubmissionResult,
    UploadedInput,
};

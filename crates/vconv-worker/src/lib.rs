//! Conversion worker.
//!
//! This crate provides:
//! - The polling job executor (one job in flight per worker)
//! - The transcode supervisor around FFmpeg
//! - Structured job logging and Prometheus metrics
//! - The retention sweep used by the cleanup binary

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod retention;
pub mod supervisor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, PollOutcome};
pub use logging::{init_tracing, JobLogger};
pub use retention::{sweep, SweepReport, DEFAULT_RETENTION_DAYS};
pub use supervisor::{InputSource, TranscodeOutput, TranscodeSupervisor};

//! Shared data models for the VConv conversion service.
//!
//! This crate provides Serde-serializable types for:
//! - Conversion jobs and their lifecycle status
//! - Output quality presets
//! - Encoding configuration
//! - Pointer blobs referencing remote media

pub mod encoding;
pub mod job;
pub mod job_status;
pub mod pointer;
pub mod preset;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{Job, JobId, INPUT_PREFIX, OUTPUT_PREFIX};
pub use job_status::{JobStatus, UnknownStatus};
pub use pointer::{MediaKind, PointerError, PointerFile, ResolvedMedia, MAX_POINTER_BYTES, POINTER_EXTENSION};
pub use preset::{InvalidPreset, Preset};

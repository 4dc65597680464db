//! FFmpeg CLI wrapper for video conversion.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:1`
//! - A heuristic progress estimate for inputs of unknown duration
//! - Downscale-only filter policy per preset
//! - Best-effort media URL extraction from HTML

pub mod command;
pub mod error;
pub mod extract;
pub mod filters;
pub mod progress;

pub use command::{transcode_command, FfmpegCommand, FfmpegProcess, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use extract::extract_media_url;
pub use filters::{scale_filter, target_dimensions};
pub use progress::{FfmpegProgress, HeuristicProgress, ProgressSignal, PROGRESS_CAP};

//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// FFmpeg ran and exited non-zero (negative codes are signals).
    #[error("ffmpeg_failed rc={exit_code}")]
    TranscodeFailed { exit_code: i32 },

    #[error("Input not found: {0}")]
    InputMissing(String),

    #[error("Output not produced: {0}")]
    OutputMissing(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vconv_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vconv_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vconv_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classify an FFmpeg run error: a process that exited with a code is a
    /// transcode failure, everything else (launch errors, IO) stays a media
    /// error.
    pub fn from_ffmpeg(err: vconv_media::MediaError) -> Self {
        match err.exit_code() {
            Some(exit_code) => Self::TranscodeFailed { exit_code },
            None => Self::Media(err),
        }
    }

    /// Short error class recorded in job diagnostics and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::TranscodeFailed { .. } => "TranscodeFailed",
            WorkerError::InputMissing(_) => "InputMissing",
            WorkerError::OutputMissing(_) => "OutputMissing",
            WorkerError::ConfigError(_) => "ConfigError",
            WorkerError::Storage(_) => "StorageError",
            WorkerError::Media(_) => "MediaError",
            WorkerError::Queue(_) => "QueueError",
            WorkerError::Io(_) => "IoError",
        }
    }

    /// Text stored in the job's `error` field.
    ///
    /// A non-zero FFmpeg exit is `ffmpeg_failed rc=<code>`; anything else is
    /// `exception:<kind>:<message>`.
    pub fn failure_message(&self) -> String {
        match self {
            WorkerError::TranscodeFailed { .. } => self.to_string(),
            WorkerError::InputMissing(msg)
            | WorkerError::OutputMissing(msg)
            | WorkerError::ConfigError(msg) => format!("exception:{}:{}", self.kind(), msg),
            WorkerError::Storage(e) => format!("exception:{}:{}", self.kind(), e),
            WorkerError::Media(e) => format!("exception:{}:{}", self.kind(), e),
            WorkerError::Queue(e) => format!("exception:{}:{}", self.kind(), e),
            WorkerError::Io(e) => format!("exception:{}:{}", self.kind(), e),
        }
    }

    /// Metric label for a failed job.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            WorkerError::TranscodeFailed { .. } => "ffmpeg_failed",
            _ => "exception",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vconv_media::MediaError;

    #[test]
    fn test_transcode_failure_message() {
        let err = WorkerError::from_ffmpeg(MediaError::ffmpeg_failed("exit", None, Some(1)));
        assert_eq!(err.failure_message(), "ffmpeg_failed rc=1");
        assert_eq!(err.failure_reason(), "ffmpeg_failed");

        let killed = WorkerError::from_ffmpeg(MediaError::ffmpeg_failed("exit", None, Some(-9)));
        assert_eq!(killed.failure_message(), "ffmpeg_failed rc=-9");
    }

    #[test]
    fn test_exception_message() {
        let err = WorkerError::from_ffmpeg(MediaError::FfmpegNotFound("ffmpeg".into()));
        assert_eq!(
            err.failure_message(),
            "exception:MediaError:FFmpeg not found: ffmpeg"
        );
        assert_eq!(err.failure_reason(), "exception");

        let err = WorkerError::InputMissing("inputs/a.mp4".into());
        assert_eq!(err.failure_message(), "exception:InputMissing:inputs/a.mp4");

        let err = WorkerError::from(vconv_storage::StorageError::not_found("inputs/b.mp4"));
        assert!(err.failure_message().starts_with("exception:StorageError:"));
    }
}

//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default delay between polls of an empty queue.
pub const DEFAULT_POLL_SECONDS: f64 = 2.0;

/// Default delay after a failed claim (job store unreachable).
pub const DEFAULT_ERROR_BACKOFF_SECONDS: f64 = 5.0;

/// Worker configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// FFmpeg binary name or path
    pub ffmpeg_bin: String,
    /// Sleep between polls when no job is queued
    pub poll_interval: Duration,
    /// Sleep after the job store failed to answer a claim
    pub error_backoff: Duration,
    /// Parent directory for per-job scratch directories
    pub work_dir: PathBuf,
    /// Prometheus listener port; metrics are off when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_SECONDS),
            error_backoff: Duration::from_secs_f64(DEFAULT_ERROR_BACKOFF_SECONDS),
            work_dir: std::env::temp_dir().join("vconv"),
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values fall back
    /// to defaults.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            ffmpeg_bin: non_empty("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            poll_interval: non_empty("WORKER_POLL_SECONDS")
                .and_then(|v| seconds(&v))
                .unwrap_or(defaults.poll_interval),
            error_backoff: non_empty("WORKER_ERROR_BACKOFF_SECONDS")
                .and_then(|v| seconds(&v))
                .unwrap_or(defaults.error_backoff),
            work_dir: non_empty("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            metrics_port: non_empty("METRICS_PORT").and_then(|v| v.parse().ok()),
        }
    }
}

fn seconds(value: &str) -> Option<Duration> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> WorkerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = lookup(&[]);
        assert_eq!(config.ffmpeg_bin, "ffmpeg");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.error_backoff, Duration::from_secs(5));
        assert!(config.work_dir.ends_with("vconv"));
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn test_overrides() {
        let config = lookup(&[
            ("FFMPEG_BIN", "/opt/ffmpeg/bin/ffmpeg"),
            ("WORKER_POLL_SECONDS", "0.5"),
            ("WORKER_WORK_DIR", "/scratch"),
            ("METRICS_PORT", "9100"),
        ]);
        assert_eq!(config.ffmpeg_bin, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.work_dir, PathBuf::from("/scratch"));
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = lookup(&[
            ("FFMPEG_BIN", "  "),
            ("WORKER_POLL_SECONDS", "soon"),
            ("WORKER_ERROR_BACKOFF_SECONDS", "-3"),
            ("METRICS_PORT", "70000"),
        ]);
        assert_eq!(config.ffmpeg_bin, "ffmpeg");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.error_backoff, Duration::from_secs(5));
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn test_out_of_range_durations_fall_back() {
        let config = lookup(&[
            ("WORKER_POLL_SECONDS", "1e20"),
            ("WORKER_ERROR_BACKOFF_SECONDS", "inf"),
        ]);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.error_backoff, Duration::from_secs(5));

        let config = lookup(&[("WORKER_POLL_SECONDS", "NaN")]);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }
}

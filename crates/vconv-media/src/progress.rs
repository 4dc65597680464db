//! FFmpeg progress parsing.
//!
//! FFmpeg's `-progress` output is a stream of `key=value` lines, each block
//! terminated by `progress=continue` or `progress=end`. The source duration is
//! never probed, so [`HeuristicProgress`] turns the stream into a monotonic
//! estimate rather than a true percentage.

/// Estimated progress never exceeds this value before the job completes.
pub const PROGRESS_CAP: u8 = 95;

/// Increment applied per elapsed-output-time report.
pub const PROGRESS_STEP: u8 = 1;

/// Progress stream state: the last reported output time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FfmpegProgress {
    /// Output time in milliseconds
    pub out_time_ms: i64,
}

/// Event extracted from a single progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    /// Elapsed output time reported, in milliseconds
    OutTime(i64),
    /// `progress=end`: the tool finished writing
    End,
}

impl FfmpegProgress {
    /// Fold one line into the current state.
    ///
    /// Only `out_time_ms` produces a tick: FFmpeg emits `out_time_us` and
    /// `out_time` in the same block, and counting those too would advance the
    /// estimate several times per report.
    pub fn apply_line(&mut self, line: &str) -> Option<ProgressSignal> {
        let (key, value) = line.trim().split_once('=')?;

        match (key.trim(), value.trim()) {
            ("out_time_ms", value) => {
                // Despite the name FFmpeg reports microseconds here
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
                Some(ProgressSignal::OutTime(self.out_time_ms))
            }
            ("progress", "end") => Some(ProgressSignal::End),
            _ => None,
        }
    }
}

/// Monotonic progress estimate: +[`PROGRESS_STEP`] per tick up to [`PROGRESS_CAP`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeuristicProgress {
    percent: u8,
}

impl HeuristicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Advance by one tick. Returns the new value, or `None` once capped.
    pub fn advance(&mut self) -> Option<u8> {
        let next = self.percent.saturating_add(PROGRESS_STEP).min(PROGRESS_CAP);
        if next == self.percent {
            return None;
        }
        self.percent = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block() {
        let mut progress = FfmpegProgress::default();

        assert_eq!(progress.apply_line("frame=120"), None);
        assert_eq!(progress.apply_line("fps=29.97"), None);
        assert_eq!(progress.apply_line("out_time_us=5000000"), None);
        assert_eq!(
            progress.apply_line("out_time_ms=5000000"),
            Some(ProgressSignal::OutTime(5000))
        );
        assert_eq!(progress.apply_line("out_time=00:00:05.000000"), None);
        assert_eq!(progress.apply_line("speed=1.5x"), None);
        assert_eq!(progress.apply_line("progress=continue"), None);
        assert_eq!(progress.out_time_ms, 5000);

        assert_eq!(progress.apply_line("progress=end"), Some(ProgressSignal::End));
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let mut progress = FfmpegProgress::default();
        assert_eq!(progress.apply_line(""), None);
        assert_eq!(progress.apply_line("garbage"), None);
        assert_eq!(progress.apply_line("speed=N/A"), None);
        // A tick is still a tick even when the value is unparseable
        assert_eq!(
            progress.apply_line("out_time_ms=N/A"),
            Some(ProgressSignal::OutTime(0))
        );
    }

    #[test]
    fn test_heuristic_caps_at_95() {
        let mut estimate = HeuristicProgress::new();
        assert_eq!(estimate.advance(), Some(1));
        assert_eq!(estimate.advance(), Some(2));

        for _ in 0..200 {
            estimate.advance();
        }
        assert_eq!(estimate.percent(), PROGRESS_CAP);
        assert_eq!(estimate.advance(), None);
    }
}

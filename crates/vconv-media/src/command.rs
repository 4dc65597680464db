//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vconv_models::{EncodingConfig, Preset};

use crate::error::{MediaError, MediaResult};
use crate::filters::scale_filter;
use crate::progress::{FfmpegProgress, ProgressSignal};

/// Lines of stderr kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or URL
    input: String,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    ///
    /// `input` is passed through verbatim so it may be a local path or a
    /// remote URL FFmpeg streams from.
    pub fn new(input: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.into(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Apply codec, quality and muxer settings.
    pub fn encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        // Overwrite, errors only
        args.push("-y".to_string());
        args.push("-v".to_string());
        args.push("error".to_string());

        // Input file or URL
        args.push("-i".to_string());
        args.push(self.input.clone());

        // Machine-readable progress on stdout, human stats off
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());
        args.push("-nostats".to_string());

        // Output args
        args.extend(self.output_args.clone());

        // Output file
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Build the conversion command for a preset: optional downscale filter
/// followed by the fixed H.264/AAC fast-start encoding.
pub fn transcode_command(
    input: impl Into<String>,
    output: impl AsRef<Path>,
    preset: Preset,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output);
    if let Some(filter) = scale_filter(preset) {
        cmd = cmd.video_filter(filter);
    }
    cmd.encoding(&EncodingConfig::default())
}

/// Launches FFmpeg from a configured binary name or path.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    bin: String,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRunner {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Resolve the binary via `PATH` (or as a path, if it contains one).
    pub fn locate(&self) -> MediaResult<PathBuf> {
        which::which(&self.bin).map_err(|_| MediaError::FfmpegNotFound(self.bin.clone()))
    }

    /// Run `<bin> -version` and return its first line.
    pub async fn version(&self) -> MediaResult<String> {
        let bin = self.locate()?;
        let output = Command::new(bin)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg -version failed",
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
                exit_code(&output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }

    /// Spawn FFmpeg for `cmd`.
    ///
    /// The child is killed if the returned handle is dropped before
    /// [`FfmpegProcess::finish`], so an early return never leaks a process.
    pub fn spawn(&self, cmd: &FfmpegCommand) -> MediaResult<FfmpegProcess> {
        let bin = self.locate()?;
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", bin.display(), args.join(" "));

        let mut child = Command::new(&bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        Ok(FfmpegProcess {
            child,
            lines: BufReader::new(stdout).lines(),
            progress: FfmpegProgress::default(),
            stderr_tail: tokio::spawn(collect_tail(stderr)),
        })
    }
}

/// A running FFmpeg process whose progress stream is read line by line.
pub struct FfmpegProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    progress: FfmpegProgress,
    stderr_tail: JoinHandle<String>,
}

impl FfmpegProcess {
    /// Read until the next progress signal.
    ///
    /// Returns `Ok(None)` when the stream closes without `progress=end`.
    pub async fn next_signal(&mut self) -> MediaResult<Option<ProgressSignal>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Some(signal) = self.progress.apply_line(&line) {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }

    /// Wait for exit. A non-zero status becomes [`MediaError::FfmpegFailed`]
    /// carrying the exit code and the tail of stderr.
    pub async fn finish(mut self) -> MediaResult<()> {
        // Drain whatever is left so the child never blocks on a full pipe
        while let Ok(Some(_)) = self.lines.next_line().await {}

        let status = self.child.wait().await?;
        let stderr = match self.stderr_tail.await {
            Ok(tail) => tail,
            Err(e) => {
                warn!("FFmpeg stderr reader failed: {}", e);
                String::new()
            }
        };

        if status.success() {
            return Ok(());
        }

        let code = exit_code(&status);
        warn!(exit_code = ?code, stderr = %stderr, "FFmpeg exited with non-zero status");
        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            (!stderr.is_empty()).then_some(stderr),
            code,
        ))
    }
}

/// Exit code, or the negated signal number when killed by a signal.
#[cfg(unix)]
fn exit_code(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| -s))
}

#[cfg(not(unix))]
fn exit_code(status: &ExitStatus) -> Option<i32> {
    status.code()
}

async fn collect_tail<R>(reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}

//! Transcode supervisor: resolves a job's input, runs FFmpeg with a progress
//! stream, and places the result at `outputs/<id>.mp4`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use vconv_media::{transcode_command, FfmpegRunner, HeuristicProgress, ProgressSignal};
use vconv_models::{Job, PointerFile, MAX_POINTER_BYTES};
use vconv_queue::JobStore;
use vconv_storage::BlobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Log a progress line every this many percent.
const PROGRESS_LOG_EVERY: u8 = 10;

/// Where FFmpeg reads the job's input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A file on local disk (the stored blob or a scratch copy of it)
    Local(PathBuf),
    /// A remote media URL taken from a pointer blob
    Remote(String),
}

impl InputSource {
    /// Value passed to `-i`.
    pub fn as_ffmpeg_input(&self) -> String {
        match self {
            InputSource::Local(path) => path.to_string_lossy().into_owned(),
            InputSource::Remote(url) => url.clone(),
        }
    }
}

/// A finished transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOutput {
    pub output_key: String,
    pub size: u64,
}

/// Runs one job's conversion from input blob to output blob.
///
/// Scratch files live in a per-job directory under the work dir that is
/// removed when the call returns, whatever the outcome.
pub struct TranscodeSupervisor {
    runner: FfmpegRunner,
    jobs: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    work_dir: PathBuf,
}

impl TranscodeSupervisor {
    pub fn new(config: &WorkerConfig, jobs: Arc<dyn JobStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            runner: FfmpegRunner::new(config.ffmpeg_bin.clone()),
            jobs,
            blobs,
            work_dir: config.work_dir.clone(),
        }
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    /// Convert `job`, reporting heuristic progress to the job store.
    ///
    /// Does not finalize the job; the caller records `done` or `failed`.
    pub async fn transcode(&self, job: &Job) -> WorkerResult<TranscodeOutput> {
        let logger = JobLogger::new(job.id, "transcode");

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job.id))
            .tempdir_in(&self.work_dir)?;

        let input = self.resolve_input(job, scratch.path()).await?;
        if let InputSource::Remote(ref url) = input {
            logger.remote_input(url);
        }

        let output_key = job.id.output_key();
        let final_path = self.blobs.local_path(&output_key);
        let output_path = final_path
            .clone()
            .unwrap_or_else(|| scratch.path().join("output.mp4"));

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = self.run_ffmpeg(job, &input, &output_path, &logger).await;
        let result = match result {
            Ok(()) => self.store_output(&output_key, &output_path, final_path.is_some()).await,
            Err(e) => Err(e),
        };

        if result.is_err() && final_path.is_some() {
            remove_quietly(&output_path).await;
        }

        if let Err(e) = scratch.close() {
            warn!(job_id = %job.id, "Failed to remove scratch directory: {}", e);
        }

        result.map(|size| TranscodeOutput { output_key, size })
    }

    /// Pointer blobs become a remote input; anything else is read from disk,
    /// fetching into `scratch` when the store is remote.
    pub async fn resolve_input(&self, job: &Job, scratch: &Path) -> WorkerResult<InputSource> {
        let size = self
            .blobs
            .size(&job.input_key)
            .await?
            .ok_or_else(|| WorkerError::InputMissing(job.input_key.clone()))?;

        if size < MAX_POINTER_BYTES {
            let bytes = self.blobs.get(&job.input_key).await?;
            if let Some(pointer) = PointerFile::parse(&bytes) {
                debug!(job_id = %job.id, url = %pointer.url, "Input is a pointer blob");
                return Ok(InputSource::Remote(pointer.url));
            }
            if let Some(path) = self.blobs.local_path(&job.input_key) {
                return Ok(InputSource::Local(path));
            }
            let path = scratch.join(scratch_input_name(&job.input_key));
            tokio::fs::write(&path, &bytes).await?;
            return Ok(InputSource::Local(path));
        }

        if let Some(path) = self.blobs.local_path(&job.input_key) {
            return Ok(InputSource::Local(path));
        }

        let path = scratch.join(scratch_input_name(&job.input_key));
        let fetched = self.blobs.get_to_file(&job.input_key, &path).await?;
        debug!(job_id = %job.id, bytes = fetched, "Fetched input to scratch");
        Ok(InputSource::Local(path))
    }

    async fn run_ffmpeg(
        &self,
        job: &Job,
        input: &InputSource,
        output: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let cmd = transcode_command(input.as_ffmpeg_input(), output, job.preset);
        let mut process = self.runner.spawn(&cmd).map_err(WorkerError::from_ffmpeg)?;
        let mut progress = HeuristicProgress::new();

        loop {
            match process.next_signal().await.map_err(WorkerError::from_ffmpeg)? {
                Some(ProgressSignal::OutTime(_)) => {
                    let Some(percent) = progress.advance() else {
                        continue;
                    };
                    if let Err(e) = self.jobs.update_progress(&job.id, percent).await {
                        logger.warning(&format!("progress update failed: {}", e));
                    }
                    if percent % PROGRESS_LOG_EVERY == 0 {
                        logger.progress(percent);
                    }
                }
                Some(ProgressSignal::End) => break,
                None => {
                    debug!(job_id = %job.id, "Progress stream closed without end marker");
                    break;
                }
            }
        }

        process.finish().await.map_err(WorkerError::from_ffmpeg)
    }

    /// Check the produced file and, for remote stores, upload it.
    async fn store_output(&self, key: &str, path: &Path, in_place: bool) -> WorkerResult<u64> {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            _ => return Err(WorkerError::OutputMissing(path.display().to_string())),
        };

        if in_place {
            return Ok(size);
        }

        let stored = self.blobs.put_file(key, path).await?;
        info!(key = %key, bytes = stored, backend = self.blobs.backend(), "Uploaded output");
        Ok(stored)
    }
}

/// Scratch file name for a fetched input, keeping its extension so FFmpeg
/// can probe the container.
fn scratch_input_name(input_key: &str) -> String {
    match Path::new(input_key).extension() {
        Some(ext) => format!("input.{}", ext.to_string_lossy()),
        None => "input".to_string(),
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

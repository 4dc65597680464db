//! Job submission: intake of inputs, job creation, status and download
//! authorization. The HTTP layer is a thin wrapper over this service.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use vconv_models::{
    Job, JobId, JobStatus, PointerFile, Preset, ResolvedMedia, INPUT_PREFIX, POINTER_EXTENSION,
};
use vconv_storage::{BlobStore, DeliveryError, DownloadUrlGenerator, StorageError};

use crate::error::QueueError;
use crate::store::JobStore;

/// Default cap on uploaded and fetched inputs (1 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

/// Longest original filename considered when deriving the key extension.
const MAX_FILENAME_CHARS: usize = 180;

/// Longest extension carried over into an input key (without the dot).
const MAX_EXTENSION_CHARS: usize = 10;

pub type SubmissionResult<T> = Result<T, SubmissionError>;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Input too large: {size} bytes exceeds limit of {limit}")]
    InputTooLarge { size: u64, limit: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] DeliveryError),

    #[error("Remote fetch failed: {0}")]
    Fetch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubmissionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Size limits for intake.
#[derive(Debug, Clone, Copy)]
pub struct IntakeLimits {
    pub max_upload_bytes: u64,
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl IntakeLimits {
    pub fn from_env() -> Self {
        Self {
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }
}

/// A stored input ready to be referenced by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedInput {
    pub key: String,
    pub size: u64,
}

/// Client-facing view of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub preset: Preset,
    pub error: String,
    /// Only set once the job is done
    pub download_url: Option<String>,
}

/// Result of an authorized download request.
#[derive(Debug, Clone)]
pub struct DownloadGrant {
    pub job_id: JobId,
    pub output_key: String,
    /// File to stream when the store is local disk
    pub local_path: Option<PathBuf>,
    /// Suggested attachment filename
    pub filename: String,
}

/// Entry point for everything a client does before and after conversion.
pub struct JobSubmission {
    jobs: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    urls: DownloadUrlGenerator,
    limits: IntakeLimits,
    http: reqwest::Client,
}

impl JobSubmission {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        urls: DownloadUrlGenerator,
        limits: IntakeLimits,
    ) -> Self {
        Self {
            jobs,
            blobs,
            urls,
            limits,
            http: reqwest::Client::new(),
        }
    }

    pub fn limits(&self) -> IntakeLimits {
        self.limits
    }

    fn check_size(&self, size: u64) -> SubmissionResult<()> {
        if size > self.limits.max_upload_bytes {
            return Err(SubmissionError::InputTooLarge {
                size,
                limit: self.limits.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Store uploaded bytes under a fresh `inputs/` key.
    pub async fn upload_input(&self, filename: &str, data: Vec<u8>) -> SubmissionResult<UploadedInput> {
        if data.is_empty() {
            return Err(SubmissionError::validation("Missing file"));
        }
        self.check_size(data.len() as u64)?;

        let key = new_input_key(&extension_of(filename));
        let size = self.blobs.put(&key, data).await?;

        info!(key = %key, size, "Stored uploaded input");
        Ok(UploadedInput { key, size })
    }

    /// Stream a remote http(s) resource into the blob store.
    ///
    /// Aborts as soon as the body exceeds the upload limit; nothing is
    /// stored in that case.
    pub async fn fetch_remote_input(&self, url: &str) -> SubmissionResult<UploadedInput> {
        let parsed = Url::parse(url.trim())
            .map_err(|_| SubmissionError::validation(format!("Invalid URL: {}", url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SubmissionError::validation("Only http(s) URLs can be fetched"));
        }

        let response = self
            .http
            .get(parsed.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SubmissionError::Fetch(e.to_string()))?;

        if let Some(len) = response.content_length() {
            self.check_size(len)?;
        }

        let staging = tempfile::NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(staging.reopen()?);
        let mut size: u64 = 0;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| SubmissionError::Fetch(e.to_string()))?;
            size += chunk.len() as u64;
            self.check_size(size)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        if size == 0 {
            return Err(SubmissionError::Fetch(format!("{} returned an empty body", parsed)));
        }

        let key = new_input_key(&extension_of(parsed.path()));
        let stored = self.blobs.put_file(&key, staging.path()).await?;

        info!(key = %key, size = stored, source = %parsed, "Stored fetched input");
        Ok(UploadedInput { key, size: stored })
    }

    /// Store a `.url` pointer blob for a resolved remote media URL, so the
    /// transcoder streams from the origin instead of a local copy.
    pub async fn store_pointer(
        &self,
        resolved: &ResolvedMedia,
        source_page: Option<&str>,
    ) -> SubmissionResult<UploadedInput> {
        let (Some(kind), Some(media_url)) = (resolved.kind, resolved.media_url.as_deref()) else {
            return Err(SubmissionError::validation(format!(
                "No media URL resolved: {}",
                resolved.reason
            )));
        };
        if !resolved.ok {
            return Err(SubmissionError::validation(resolved.reason.clone()));
        }

        let pointer = PointerFile::new(media_url, kind, source_page)
            .map_err(|e| SubmissionError::validation(e.to_string()))?;

        let key = new_input_key(POINTER_EXTENSION);
        let size = self.blobs.put(&key, pointer.render().into_bytes()).await?;

        debug!(key = %key, url = %pointer.url, "Stored pointer input");
        Ok(UploadedInput { key, size })
    }

    /// Validate and enqueue a job.
    ///
    /// An empty preset means the default (`720p`). The input must live under
    /// `inputs/` and already exist. Negative sizes are recorded as 0.
    pub async fn create(
        &self,
        preset: &str,
        input_key: &str,
        input_size_bytes: i64,
    ) -> SubmissionResult<Job> {
        let preset = match preset.trim() {
            "" => Preset::default(),
            name => name
                .parse::<Preset>()
                .map_err(|e| SubmissionError::validation(e.to_string()))?,
        };

        let input_key = input_key.trim();
        if !input_key.starts_with(INPUT_PREFIX) || input_key.len() == INPUT_PREFIX.len() {
            return Err(SubmissionError::validation("Invalid input_key"));
        }

        match self.blobs.exists(input_key).await {
            Ok(true) => {}
            Ok(false) => return Err(SubmissionError::validation("Input not found")),
            Err(StorageError::InvalidKey(_)) => {
                return Err(SubmissionError::validation("Invalid input_key"))
            }
            Err(e) => return Err(e.into()),
        }

        let job = Job::new(preset, input_key, input_size_bytes.max(0) as u64);
        self.jobs.insert(&job).await?;

        info!(job_id = %job.id, preset = %job.preset, input_key = %job.input_key, "Job queued");
        Ok(job)
    }

    /// Status snapshot; `None` for an unknown id.
    pub async fn get_status(&self, id: &JobId) -> SubmissionResult<Option<JobStatusView>> {
        let Some(job) = self.jobs.get(id).await? else {
            return Ok(None);
        };

        let download_url = if job.status == JobStatus::Done && !job.output_key.is_empty() {
            Some(self.urls.download_url(&job.id, &job.output_key).await?.url)
        } else {
            None
        };

        Ok(Some(JobStatusView {
            id: job.id,
            status: job.status,
            progress: job.progress,
            preset: job.preset,
            error: job.error,
            download_url,
        }))
    }

    /// Check a signed download request for a finished job.
    pub async fn authorize_download(
        &self,
        id: &JobId,
        expires_at: i64,
        signature: &str,
    ) -> SubmissionResult<DownloadGrant> {
        let job = self
            .jobs
            .get(id)
            .await?
            .filter(|j| j.status == JobStatus::Done && !j.output_key.is_empty())
            .ok_or_else(|| SubmissionError::NotFound(id.to_string()))?;

        self.urls
            .signer()
            .verify(&job.id, &job.output_key, expires_at, signature)?;

        let local_path = self.blobs.local_path(&job.output_key);
        if let Some(ref path) = local_path {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(SubmissionError::NotFound(job.output_key));
            }
        }

        Ok(DownloadGrant {
            job_id: job.id,
            filename: format!("{}.mp4", job.id),
            output_key: job.output_key,
            local_path,
        })
    }
}

/// `inputs/<uuid hex><ext>`.
fn new_input_key(ext: &str) -> String {
    format!("{}{}{}", INPUT_PREFIX, Uuid::new_v4().simple(), ext)
}

/// Lowercased `.ext` of the final path segment, or empty when absent or
/// not plain alphanumeric.
fn extension_of(name: &str) -> String {
    let name: String = name.chars().take(MAX_FILENAME_CHARS).collect();
    let Some(file_name) = Path::new(&name).file_name() else {
        return String::new();
    };

    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_CHARS
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryJobStore;
    use vconv_models::MediaKind;
    use vconv_storage::{DeliveryConfig, LocalBlobStore};

    struct Fixture {
        _dir: tempfile::TempDir,
        jobs: Arc<MemoryJobStore>,
        blobs: Arc<LocalBlobStore>,
        submission: JobSubmission,
    }

    async fn fixture(limit: u64) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let blobs = Arc::new(LocalBlobStore::new(dir.path()));
        blobs.ensure_dirs().await.unwrap();
        let jobs = Arc::new(MemoryJobStore::new());

        let config = DeliveryConfig {
            signing_secret: "test-secret".to_string(),
            ..Default::default()
        };
        let urls = DownloadUrlGenerator::new(blobs.clone(), config).unwrap();
        let submission = JobSubmission::new(
            jobs.clone(),
            blobs.clone(),
            urls,
            IntakeLimits {
                max_upload_bytes: limit,
            },
        );

        Fixture {
            _dir: dir,
            jobs,
            blobs,
            submission,
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("Holiday.MP4"), ".mp4");
        assert_eq!(extension_of("/videos/clip.webm"), ".webm");
        assert_eq!(extension_of("no_extension"), "");
        assert_eq!(extension_of("evil.m/../p4"), "");
        assert_eq!(extension_of("weird.tar-gz"), "");
        assert_eq!(extension_of(""), "");
    }

    #[test]
    fn test_input_key_layout() {
        let key = new_input_key(".mov");
        assert!(key.starts_with("inputs/"));
        assert!(key.ends_with(".mov"));
        assert_eq!(key.len(), "inputs/".len() + 32 + 4);
    }

    #[tokio::test]
    async fn test_upload_and_create() {
        let f = fixture(1024).await;

        let uploaded = f.submission.upload_input("My Clip.MOV", vec![7; 100]).await.unwrap();
        assert_eq!(uploaded.size, 100);
        assert!(uploaded.key.ends_with(".mov"));

        let job = f.submission.create("480p", &uploaded.key, 100).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.preset, Preset::P480);
        assert_eq!(f.jobs.len().await, 1);

        let defaulted = f.submission.create("", &uploaded.key, -5).await.unwrap();
        assert_eq!(defaulted.preset, Preset::P720);
        assert_eq!(defaulted.input_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_upload_limits() {
        let f = fixture(10).await;
        assert!(matches!(
            f.submission.upload_input("a.mp4", vec![0; 11]).await,
            Err(SubmissionError::InputTooLarge { size: 11, limit: 10 })
        ));
        assert!(matches!(
            f.submission.upload_input("a.mp4", Vec::new()).await,
            Err(SubmissionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = fixture(1024).await;
        let uploaded = f.submission.upload_input("a.mp4", vec![1; 4]).await.unwrap();

        for (preset, key) in [
            ("4k", uploaded.key.as_str()),
            ("720p", "outputs/x.mp4"),
            ("720p", "inputs/"),
            ("720p", "inputs/missing.mp4"),
            ("720p", "inputs/../etc/passwd"),
        ] {
            assert!(
                matches!(
                    f.submission.create(preset, key, 0).await,
                    Err(SubmissionError::Validation(_))
                ),
                "{preset} {key} should be rejected"
            );
        }
        assert_eq!(f.jobs.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_pointer() {
        let f = fixture(1024).await;
        let resolved = ResolvedMedia::found(MediaKind::Mp4, "https://example.com/v.mp4", "found_mp4_in_html");

        let stored = f
            .submission
            .store_pointer(&resolved, Some("https://example.com/watch"))
            .await
            .unwrap();
        assert!(stored.key.ends_with(".url"));

        let bytes = f.blobs.get(&stored.key).await.unwrap();
        let pointer = PointerFile::parse(&bytes).unwrap();
        assert_eq!(pointer.url, "https://example.com/v.mp4");
        assert_eq!(pointer.source.as_deref(), Some("https://example.com/watch"));

        let missing = ResolvedMedia::not_found("no_media_url_found_in_html");
        assert!(f.submission.store_pointer(&missing, None).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http() {
        let f = fixture(1024).await;
        assert!(matches!(
            f.submission.fetch_remote_input("ftp://example.com/a.mp4").await,
            Err(SubmissionError::Validation(_))
        ));
        assert!(matches!(
            f.submission.fetch_remote_input("not a url").await,
            Err(SubmissionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_status_and_download() {
        let f = fixture(1024).await;
        let uploaded = f.submission.upload_input("a.mp4", vec![1; 4]).await.unwrap();
        let job = f.submission.create("original", &uploaded.key, 4).await.unwrap();

        let view = f.submission.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.download_url, None);

        // Not done yet
        assert!(matches!(
            f.submission.authorize_download(&job.id, i64::MAX, "x").await,
            Err(SubmissionError::NotFound(_))
        ));

        f.jobs.claim_next().await.unwrap().unwrap();
        f.blobs.put(&job.id.output_key(), b"mp4".to_vec()).await.unwrap();
        f.jobs.complete(&job.id, &job.id.output_key()).await.unwrap();

        let view = f.submission.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Done);
        assert_eq!(view.progress, 100);
        let url = view.download_url.unwrap();

        let query = url.split_once("?exp=").unwrap().1;
        let (exp, sig) = query.split_once("&sig=").unwrap();
        let exp: i64 = exp.parse().unwrap();

        let grant = f.submission.authorize_download(&job.id, exp, sig).await.unwrap();
        assert_eq!(grant.output_key, job.id.output_key());
        assert_eq!(grant.filename, format!("{}.mp4", job.id));
        assert!(grant.local_path.unwrap().exists());

        assert!(matches!(
            f.submission.authorize_download(&job.id, exp, "AAAA").await,
            Err(SubmissionError::Unauthorized(DeliveryError::InvalidSignature))
        ));
        assert!(matches!(
            f.submission.authorize_download(&job.id, 1, sig).await,
            Err(SubmissionError::Unauthorized(DeliveryError::Expired))
        ));

        assert!(f.submission.get_status(&JobId::new()).await.unwrap().is_none());
    }
}

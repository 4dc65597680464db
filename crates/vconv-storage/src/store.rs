//! Blob store capability and backend selection.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::local::LocalBlobStore;
use crate::s3::{S3BlobStore, S3Config};

/// Default local media root.
pub const DEFAULT_MEDIA_ROOT: &str = "/var/data/media";

/// Key-addressed storage for input and output bytes.
///
/// Keys are relative, `/`-separated paths such as `inputs/<name>` or
/// `outputs/<id>.mp4`. Concurrent access to disjoint keys is always safe.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<u64>;

    /// Store the file at `path` under `key`.
    ///
    /// The source file may be moved rather than copied; callers must not
    /// rely on it afterwards.
    async fn put_file(&self, key: &str, path: &Path) -> StorageResult<u64>;

    /// Read the whole object.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Copy the object into a local file.
    async fn get_to_file(&self, key: &str, path: &Path) -> StorageResult<u64>;

    /// Object size, `None` if the key does not exist.
    async fn size(&self, key: &str) -> StorageResult<Option<u64>>;

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.size(key).await?.is_some())
    }

    /// Delete the object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Backend-native presigned GET URL, `None` when unsupported.
    async fn presign_get(&self, _key: &str, _ttl: Duration) -> StorageResult<Option<String>> {
        Ok(None)
    }

    /// Backend-native presigned PUT URL, `None` when unsupported.
    async fn presign_put(&self, _key: &str, _ttl: Duration) -> StorageResult<Option<String>> {
        Ok(None)
    }

    /// Filesystem path of the object when the store is local disk.
    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }
}

/// Reject keys that could escape the store namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') || key.ends_with('/') {
        return Err(StorageError::invalid_key(key));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// Content type recorded for a key on upload.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "url" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Which backend to use, decided once at startup.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { media_root: PathBuf },
    S3(S3Config),
}

impl StorageConfig {
    /// `S3_BUCKET` selects the S3-compatible backend; otherwise local disk
    /// under `MEDIA_ROOT`.
    pub fn from_env() -> StorageResult<Self> {
        let bucket = std::env::var("S3_BUCKET")
            .ok()
            .filter(|b| !b.trim().is_empty());

        match bucket {
            Some(bucket) => Ok(Self::S3(S3Config::from_env(bucket)?)),
            None => Ok(Self::Local {
                media_root: std::env::var("MEDIA_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            }),
        }
    }

    /// Construct the configured store.
    pub async fn build(self) -> StorageResult<Arc<dyn BlobStore>> {
        match self {
            Self::Local { media_root } => {
                let store = LocalBlobStore::new(media_root);
                store.ensure_dirs().await?;
                info!(root = %store.root().display(), "Using local blob store");
                Ok(Arc::new(store))
            }
            Self::S3(config) => {
                info!(bucket = %config.bucket, "Using S3 blob store");
                Ok(Arc::new(S3BlobStore::new(config)))
            }
        }
    }
}

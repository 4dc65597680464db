//! Local-disk blob store rooted at the media directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use vconv_models::{INPUT_PREFIX, OUTPUT_PREFIX};

use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{move_file, write_atomic};
use crate::store::{validate_key, BlobStore};

/// Blob store backed by a directory; keys map to relative paths.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and the `inputs/` and `outputs/` namespaces.
    pub async fn ensure_dirs(&self) -> StorageResult<()> {
        for prefix in [INPUT_PREFIX, OUTPUT_PREFIX] {
            fs::create_dir_all(self.root.join(prefix)).await.map_err(|e| {
                StorageError::config_error(format!(
                    "cannot create {}: {}",
                    self.root.join(prefix).display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Resolve a key to its path, rejecting keys outside the root.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<u64> {
        let path = self.path_for(key)?;
        debug!("Writing {} bytes to {}", data.len(), path.display());
        write_atomic(&path, &data).await
    }

    async fn put_file(&self, key: &str, src: &Path) -> StorageResult<u64> {
        let path = self.path_for(key)?;
        if path == src {
            return Ok(fs::metadata(&path).await?.len());
        }
        debug!("Moving {} to {}", src.display(), path.display());
        move_file(src, &path).await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_to_file(&self, key: &str, dst: &Path) -> StorageResult<u64> {
        let path = self.path_for(key)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::copy(&path, dst).await {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", key, e))),
        }
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.path_for(key).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn store() -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("media"));
        store.ensure_dirs().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, store) = store().await;

        assert_eq!(store.put("inputs/a.bin", b"hello".to_vec()).await.unwrap(), 5);
        assert!(store.exists("inputs/a.bin").await.unwrap());
        assert_eq!(store.size("inputs/a.bin").await.unwrap(), Some(5));
        assert_eq!(store.get("inputs/a.bin").await.unwrap(), b"hello");

        store.delete("inputs/a.bin").await.unwrap();
        assert!(!store.exists("inputs/a.bin").await.unwrap());
        // Deleting again is fine
        store.delete("inputs/a.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_key() {
        let (dir, store) = store().await;
        assert_eq!(store.size("inputs/nope").await.unwrap(), None);
        assert!(matches!(
            store.get("inputs/nope").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.get_to_file("inputs/nope", &dir.path().join("x")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_file_moves_into_place() {
        let (dir, store) = store().await;
        let src = dir.path().join("work.mp4");
        fs::write(&src, b"video").await.unwrap();

        let size = store.put_file("outputs/j.mp4", &src).await.unwrap();
        assert_eq!(size, 5);
        assert!(!src.exists());
        assert_eq!(
            store.local_path("outputs/j.mp4"),
            Some(store.root().join("outputs/j.mp4"))
        );
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.put("../escape", b"x".to_vec()).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert_eq!(store.local_path("/etc/passwd"), None);
    }

    #[tokio::test]
    async fn test_no_presign_support() {
        let (_dir, store) = store().await;
        let ttl = Duration::from_secs(60);
        assert_eq!(store.presign_get("outputs/j.mp4", ttl).await.unwrap(), None);
        assert_eq!(store.presign_put("inputs/j.mp4", ttl).await.unwrap(), None);
    }
}

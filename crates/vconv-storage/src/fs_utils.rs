//! Filesystem utilities for cross-device file operations.
//!
//! Work directories and the media root frequently live on different mounts,
//! so a plain rename can fail with EXDEV.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::StorageResult;

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Attempts a fast rename first. On EXDEV it copies to a temporary sibling of
/// `dst` and renames that into place, so readers never observe a partial file.
/// Returns the size of the moved file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> StorageResult<u64> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => {}
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename detected, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(fs::metadata(dst).await?.len())
}

/// Write `data` to `dst` through a temporary sibling and an atomic rename.
pub async fn write_atomic(dst: impl AsRef<Path>, data: &[u8]) -> StorageResult<u64> {
    let dst = dst.as_ref();
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = partial_path(dst);
    if let Err(e) = fs::write(&tmp, data).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp, dst).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    Ok(data.len() as u64)
}

/// Hidden `.part` sibling used while a file is being written.
pub fn partial_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.part", name))
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    // EXDEV is error code 18 on Linux/macOS
    e.raw_os_error() == Some(18)
}

/// Copy file to destination (via temp file) then delete source.
async fn copy_and_delete(src: &Path, dst: &Path) -> StorageResult<()> {
    let tmp_dst = partial_path(dst);

    if let Err(e) = fs::copy(src, &tmp_dst).await {
        tracing::error!(
            "Failed to copy file during cross-device move: {} -> {}: {}",
            src.display(),
            tmp_dst.display(),
            e
        );
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        tracing::error!(
            "Failed to rename temp file during cross-device move: {} -> {}: {}",
            tmp_dst.display(),
            dst.display(),
            e
        );
        return Err(e.into());
    }

    // Best effort: the destination is already complete
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source file after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_to_subdirectory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.bin");
        let dst = dir.path().join("outputs").join("dest.mp4");

        fs::write(&src, b"test content").await.unwrap();

        let size = move_file(&src, &dst).await.unwrap();

        assert_eq!(size, 12);
        assert!(!src.exists(), "Source file should be removed");
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "test content");
    }

    #[tokio::test]
    async fn test_move_file_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.txt");
        let dst = dir.path().join("dest.txt");

        fs::write(&src, b"new content").await.unwrap();
        fs::write(&dst, b"old content").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dst).await.unwrap(), "new content");
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_partial() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("inputs").join("a.url");

        write_atomic(&dst, b"URL:https://example.com/v.mp4\n").await.unwrap();

        assert!(dst.exists());
        assert!(!partial_path(&dst).exists());
    }

    #[test]
    fn test_is_cross_device_error() {
        let exdev_error = std::io::Error::from_raw_os_error(18);
        assert!(is_cross_device_error(&exdev_error));

        let not_found = std::io::Error::from_raw_os_error(2);
        assert!(!is_cross_device_error(&not_found));
    }
}

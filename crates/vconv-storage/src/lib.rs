//! Blob storage for conversion inputs and outputs.
//!
//! This crate provides:
//! - The [`BlobStore`] capability with local-disk and S3-compatible backends
//! - Startup-time backend selection from the environment
//! - Cross-device safe file moves
//! - Signed download links (HMAC-SHA256) and presigned URLs

pub mod delivery;
pub mod error;
pub mod fs_utils;
pub mod local;
pub mod s3;
pub mod store;

pub use delivery::{
    DeliveryConfig, DeliveryError, DownloadSigner, DownloadUrl, DownloadUrlGenerator,
};
pub use error::{StorageError, StorageResult};
pub use local::LocalBlobStore;
pub use s3::{S3BlobStore, S3Config};
pub use store::{BlobStore, StorageConfig};

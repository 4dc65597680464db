//! S3-compatible blob store (AWS S3, Cloudflare R2, MinIO).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::{content_type_for, validate_key, BlobStore};

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3Config {
    /// Custom endpoint (R2/MinIO); `None` uses AWS
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Region ("auto" for R2)
    pub region: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}

impl S3Config {
    /// Read credentials for `bucket` from the environment.
    pub fn from_env(bucket: String) -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vconv",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("S3 connectivity check failed: {}", e)))?;
        Ok(())
    }

    async fn put_body(&self, key: &str, body: ByteStream) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(key))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;
        Ok(())
    }

    async fn get_body(&self, key: &str) -> StorageResult<ByteStream> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(format!("{}: {}", key, e))
                }
            })?;
        Ok(response.body)
    }

    fn presigning(ttl: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(ttl).map_err(|e| StorageError::PresignFailed(e.to_string()))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> StorageResult<u64> {
        validate_key(key)?;
        let size = data.len() as u64;
        debug!("Uploading {} bytes to {}", size, key);
        self.put_body(key, ByteStream::from(data)).await?;
        Ok(size)
    }

    async fn put_file(&self, key: &str, path: &Path) -> StorageResult<u64> {
        validate_key(key)?;
        let size = tokio::fs::metadata(path).await?.len();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        self.put_body(key, body).await?;

        info!("Uploaded {} to {} ({} bytes)", path.display(), key, size);
        Ok(size)
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        debug!("Downloading {}", key);

        let bytes = self
            .get_body(key)
            .await?
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();
        Ok(bytes)
    }

    async fn get_to_file(&self, key: &str, path: &Path) -> StorageResult<u64> {
        validate_key(key)?;
        debug!("Downloading {} to {}", key, path.display());

        let body = self.get_body(key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = Box::pin(body.into_async_read());
        let mut file = tokio::fs::File::create(path).await?;
        let size = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("{}: {}", key, e)))?;

        info!("Downloaded {} to {} ({} bytes)", key, path.display(), size);
        Ok(size)
    }

    async fn size(&self, key: &str) -> StorageResult<Option<u64>> {
        validate_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(head.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(StorageError::AwsSdk(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(format!("{}: {}", key, e)))?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;
        Ok(Some(presigned.uri().to_string()))
    }

    async fn presign_put(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        validate_key(key)?;
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type_for(key))
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;
        Ok(Some(presigned.uri().to_string()))
    }
}

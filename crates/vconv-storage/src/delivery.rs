//! Download delivery: time-limited signed links for finished outputs.
//!
//! When the blob store can presign (S3) the backend-native URL is used.
//! Otherwise the link points at the service's own download route and carries
//! an HMAC-SHA256 signature over `job_id|output_key|expires_at`.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use vconv_models::JobId;

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

type HmacSha256 = Hmac<Sha256>;

/// Default link lifetime (1 hour).
pub const DEFAULT_SIGNED_URL_EXPIRES_SECS: u64 = 3600;

/// Maximum allowed expiry (7 days) to prevent long-lived URL leakage.
pub const MAX_EXPIRY_SECS: u64 = 604800;

/// Development fallback secret; never use in production.
pub const DEFAULT_SECRET_KEY: &str = "dev-only-change-me";

/// Route prefix of the download endpoint.
pub const DEFAULT_DOWNLOAD_BASE_PATH: &str = "/api/jobs";

/// Why a download token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("download link expired")]
    Expired,

    #[error("invalid download signature")]
    InvalidSignature,
}

/// Delivery configuration.
#[derive(Clone)]
pub struct DeliveryConfig {
    /// Secret key for HMAC signing.
    pub signing_secret: String,
    /// Lifetime of generated links.
    pub url_expiry: Duration,
    /// Prefix for service-signed download links.
    pub base_path: String,
}

impl std::fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("signing_secret", &"<redacted>")
            .field("url_expiry", &self.url_expiry)
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            signing_secret: DEFAULT_SECRET_KEY.to_string(),
            url_expiry: Duration::from_secs(DEFAULT_SIGNED_URL_EXPIRES_SECS),
            base_path: DEFAULT_DOWNLOAD_BASE_PATH.to_string(),
        }
    }
}

impl DeliveryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let signing_secret = std::env::var("SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string());

        let config = Self {
            signing_secret,
            url_expiry: Duration::from_secs(
                std::env::var("SIGNED_URL_EXPIRES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SIGNED_URL_EXPIRES_SECS)
                    .min(MAX_EXPIRY_SECS),
            ),
            base_path: std::env::var("DOWNLOAD_BASE_PATH")
                .unwrap_or_else(|_| DEFAULT_DOWNLOAD_BASE_PATH.to_string()),
        };

        if config.uses_default_secret() {
            warn!("SECRET_KEY not set; download links are signed with the development key");
        }
        config
    }

    pub fn uses_default_secret(&self) -> bool {
        self.signing_secret == DEFAULT_SECRET_KEY
    }
}

/// Signs and verifies download tokens.
#[derive(Clone)]
pub struct DownloadSigner {
    mac: HmacSha256,
}

impl DownloadSigner {
    /// Create a signer keyed with `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> StorageResult<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| StorageError::config_error(format!("Invalid HMAC key: {}", e)))?;
        Ok(Self { mac })
    }

    fn keyed(&self, job_id: &JobId, output_key: &str, expires_at: i64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{}|{}|{}", job_id, output_key, expires_at).as_bytes());
        mac
    }

    /// Token for `job_id|output_key|expires_at`, URL-safe base64 without padding.
    pub fn sign(&self, job_id: &JobId, output_key: &str, expires_at: i64) -> String {
        let digest = self.keyed(job_id, output_key, expires_at).finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Verify a token against the current time.
    pub fn verify(
        &self,
        job_id: &JobId,
        output_key: &str,
        expires_at: i64,
        token: &str,
    ) -> Result<(), DeliveryError> {
        self.verify_at(job_id, output_key, expires_at, token, Utc::now().timestamp())
    }

    /// Verify a token as of `now` (unix seconds).
    ///
    /// The MAC comparison is constant-time. Tokens are reusable until they
    /// expire.
    pub fn verify_at(
        &self,
        job_id: &JobId,
        output_key: &str,
        expires_at: i64,
        token: &str,
        now: i64,
    ) -> Result<(), DeliveryError> {
        if expires_at < now {
            return Err(DeliveryError::Expired);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| DeliveryError::InvalidSignature)?;

        self.keyed(job_id, output_key, expires_at)
            .verify_slice(&signature)
            .map_err(|_| DeliveryError::InvalidSignature)
    }
}

/// A generated download link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: u64,
    /// Whether the URL is backend-native (presigned) rather than service-signed
    pub presigned: bool,
}

/// URL generator for finished outputs.
#[derive(Clone)]
pub struct DownloadUrlGenerator {
    store: Arc<dyn BlobStore>,
    signer: DownloadSigner,
    config: DeliveryConfig,
}

impl DownloadUrlGenerator {
    pub fn new(store: Arc<dyn BlobStore>, config: DeliveryConfig) -> StorageResult<Self> {
        let signer = DownloadSigner::new(&config.signing_secret)?;
        Ok(Self {
            store,
            signer,
            config,
        })
    }

    pub fn signer(&self) -> &DownloadSigner {
        &self.signer
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Link for a job's output, presigned when the store supports it.
    pub async fn download_url(&self, job_id: &JobId, output_key: &str) -> StorageResult<DownloadUrl> {
        let expiry = self.config.url_expiry;
        let expires_at =
            Utc::now() + chrono::Duration::from_std(expiry).unwrap_or_default();

        if let Some(url) = self.store.presign_get(output_key, expiry).await? {
            return Ok(DownloadUrl {
                url,
                expires_at,
                expires_in_secs: expiry.as_secs(),
                presigned: true,
            });
        }

        let exp = expires_at.timestamp();
        let sig = self.signer.sign(job_id, output_key, exp);
        let url = format!(
            "{}/{}/download?exp={}&sig={}",
            self.config.base_path.trim_end_matches('/'),
            job_id,
            exp,
            urlencoding::encode(&sig)
        );

        Ok(DownloadUrl {
            url,
            expires_at,
            expires_in_secs: expiry.as_secs(),
            presigned: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBlobStore;

    const SECRET: &str = "test-secret-key-32-bytes-long!!!";

    fn job_id() -> JobId {
        "6f1c0c4e-2d55-4d1e-9a57-0d5b0a3f7d11".parse().unwrap()
    }

    #[test]
    fn test_sign_verify() {
        let signer = DownloadSigner::new(SECRET).unwrap();
        let id = job_id();
        let key = id.output_key();
        let exp = Utc::now().timestamp() + 3600;

        let token = signer.sign(&id, &key, exp);
        assert_eq!(token, signer.sign(&id, &key, exp), "signing is deterministic");
        assert!(!token.contains('='));
        assert_eq!(signer.verify(&id, &key, exp, &token), Ok(()));
    }

    #[test]
    fn test_expired_token() {
        let signer = DownloadSigner::new(SECRET).unwrap();
        let id = job_id();
        let key = id.output_key();
        let token = signer.sign(&id, &key, 1_000);

        assert_eq!(signer.verify_at(&id, &key, 1_000, &token, 1_000), Ok(()));
        assert_eq!(
            signer.verify_at(&id, &key, 1_000, &token, 1_001),
            Err(DeliveryError::Expired)
        );
    }

    #[test]
    fn test_tampered_token() {
        let signer = DownloadSigner::new(SECRET).unwrap();
        let id = job_id();
        let key = id.output_key();
        let exp = 2_000_000_000;
        let token = signer.sign(&id, &key, exp);

        // Flip a single bit of the digest
        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        raw[7] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(raw);
        assert_eq!(
            signer.verify_at(&id, &key, exp, &tampered, 0),
            Err(DeliveryError::InvalidSignature)
        );

        // Any field change breaks the signature
        assert!(signer.verify_at(&id, "outputs/other.mp4", exp, &token, 0).is_err());
        assert!(signer.verify_at(&id, &key, exp + 1, &token, 0).is_err());
        assert!(signer.verify_at(&JobId::new(), &key, exp, &token, 0).is_err());
        assert!(signer.verify_at(&id, &key, exp, "not base64!", 0).is_err());

        let other = DownloadSigner::new("another-secret").unwrap();
        assert!(other.verify_at(&id, &key, exp, &token, 0).is_err());
    }

    #[tokio::test]
    async fn test_local_store_gets_signed_route() {
        let dir = tempfile::TempDir::new().unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()));
        let config = DeliveryConfig {
            signing_secret: SECRET.to_string(),
            ..Default::default()
        };
        let generator = DownloadUrlGenerator::new(store, config).unwrap();

        let id = job_id();
        let link = generator.download_url(&id, &id.output_key()).await.unwrap();

        assert!(!link.presigned);
        assert_eq!(link.expires_in_secs, DEFAULT_SIGNED_URL_EXPIRES_SECS);
        let prefix = format!("/api/jobs/{}/download?exp=", id);
        assert!(link.url.starts_with(&prefix), "{}", link.url);

        let query = &link.url[prefix.len()..];
        let (exp, sig) = query.split_once("&sig=").unwrap();
        let exp: i64 = exp.parse().unwrap();
        assert_eq!(exp, link.expires_at.timestamp());
        assert_eq!(
            generator.signer().verify(&id, &id.output_key(), exp, sig),
            Ok(())
        );
    }
}

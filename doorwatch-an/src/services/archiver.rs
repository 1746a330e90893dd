//! Object-storage archival
//!
//! Archives artifacts under `Success/` or `Failure/` namespaces keyed by
//! year-month, returns a presigned URL for the stored object, and removes
//! the local file afterwards. S3 requests are plain HTTPS calls signed with
//! SigV4; credentials are cached and dropped after a failed request so the
//! next call re-resolves them.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, PayloadChecksumKind, PercentEncodingMode, SignableBody, SignableRequest,
    SignatureLocation, SigningSettings,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::types::Artifact;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No AWS credentials available: {0}")]
    Credentials(String),

    #[error("Request signing error: {0}")]
    Signing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage returned HTTP {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage seam
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a key; returns the object location
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StoreError>;

    /// Produce a presigned GET URL for a stored key
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;
}

/// S3-backed object store using SigV4-signed reqwest calls
pub struct S3ObjectStore {
    http_client: reqwest::Client,
    bucket: String,
    region: String,
    credentials_provider: Arc<dyn ProvideCredentials>,
    cached_credentials: Mutex<Option<Credentials>>,
}

impl S3ObjectStore {
    /// Build the store from the default AWS credential chain
    pub async fn from_env(bucket: String, region: String) -> Result<Self, StoreError> {
        let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let provider = aws_config
            .credentials_provider()
            .ok_or_else(|| StoreError::Credentials("no provider in default chain".to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            bucket,
            region,
            credentials_provider: Arc::from(provider),
            cached_credentials: Mutex::new(None),
        })
    }

    fn object_url(&self, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, encoded_key
        )
    }

    async fn credentials(&self) -> Result<Credentials, StoreError> {
        let mut guard = self.cached_credentials.lock().await;
        if let Some(credentials) = guard.as_ref() {
            return Ok(credentials.clone());
        }
        let credentials = self
            .credentials_provider
            .provide_credentials()
            .await
            .map_err(|e| StoreError::Credentials(e.to_string()))?;
        *guard = Some(credentials.clone());
        Ok(credentials)
    }

    /// Drop cached credentials after a failure; the next call re-resolves
    async fn invalidate_credentials(&self) {
        self.cached_credentials.lock().await.take();
    }

    fn signing_settings(presign_ttl: Option<Duration>) -> SigningSettings {
        let mut settings = SigningSettings::default();
        // S3 keys must not be double-encoded in the canonical request
        settings.percent_encoding_mode = PercentEncodingMode::Single;
        match presign_ttl {
            Some(ttl) => {
                settings.signature_location = SignatureLocation::QueryParams;
                settings.expires_in = Some(ttl);
            }
            None => {
                // S3 requires the x-amz-content-sha256 header
                settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
            }
        }
        settings
    }

    fn signing_params<'a>(
        &'a self,
        identity: &'a Identity,
        settings: SigningSettings,
    ) -> Result<v4::SigningParams<'a, SigningSettings>, StoreError> {
        v4::SigningParams::builder()
            .identity(identity)
            .region(&self.region)
            .name("s3")
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|e| StoreError::Signing(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        let url = self.object_url(key);
        let credentials = self.credentials().await?;
        let identity = Identity::new(credentials.clone(), credentials.expiry());

        let signing_params = self.signing_params(&identity, Self::signing_settings(None))?;
        let signable_request = SignableRequest::new(
            "PUT",
            url.as_str(),
            std::iter::empty::<(&str, &str)>(),
            SignableBody::Bytes(&bytes),
        )
        .map_err(|e| StoreError::Signing(e.to_string()))?;

        let (signing_instructions, _) = sign(signable_request, &signing_params.into())
            .map_err(|e| StoreError::Signing(e.to_string()))?
            .into_parts();

        let mut request = self.http_client.put(&url);
        for (name, value) in signing_instructions.headers() {
            request = request.header(name, value);
        }

        let response = match request.body(bytes).send().await {
            Ok(response) => response,
            Err(e) => {
                self.invalidate_credentials().await;
                return Err(StoreError::Network(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.invalidate_credentials().await;
            return Err(StoreError::Status(status.as_u16()));
        }
        Ok(url)
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        let url = self.object_url(key);
        let credentials = self.credentials().await?;
        let identity = Identity::new(credentials.clone(), credentials.expiry());

        let signing_params = self.signing_params(&identity, Self::signing_settings(Some(ttl)))?;
        let signable_request = SignableRequest::new(
            "GET",
            url.as_str(),
            std::iter::empty::<(&str, &str)>(),
            SignableBody::UnsignedPayload,
        )
        .map_err(|e| StoreError::Signing(e.to_string()))?;

        let (signing_instructions, _) = sign(signable_request, &signing_params.into())
            .map_err(|e| StoreError::Signing(e.to_string()))?
            .into_parts();

        let query = signing_instructions
            .params()
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        if query.is_empty() {
            Ok(url)
        } else {
            Ok(format!("{}?{}", url, query))
        }
    }
}

/// Archive namespace for a classified artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Success,
    Failure,
}

impl Disposition {
    pub fn prefix(self) -> &'static str {
        match self {
            Disposition::Success => "Success",
            Disposition::Failure => "Failure",
        }
    }
}

/// Uploads artifacts to the object store and disposes of local files
pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    presign_ttl: Duration,
}

impl Archiver {
    pub fn new(store: Arc<dyn ObjectStore>, presign_ttl: Duration) -> Self {
        Self { store, presign_ttl }
    }

    /// Key layout: `<Disposition>/<YYYY-MM>/<file-name>`
    pub fn archive_key(disposition: Disposition, date: NaiveDate, name: &str) -> String {
        format!(
            "{}/{}/{}",
            disposition.prefix(),
            date.format("%Y-%m"),
            name
        )
    }

    /// Upload the artifact; returns the presigned location when available
    ///
    /// A presign failure is degraded to `None` rather than an error: the
    /// object is stored either way, and only the after-stored callback
    /// loses its payload.
    pub async fn archive(
        &self,
        artifact: &Artifact,
        disposition: Disposition,
    ) -> Result<Option<String>, StoreError> {
        info!("Moving {} to object storage", artifact.name());
        let bytes = artifact.read_bytes().await?;
        let key = Self::archive_key(disposition, Local::now().date_naive(), artifact.name());

        self.store.put(&key, bytes).await?;

        match self.store.presign(&key, self.presign_ttl).await {
            Ok(location) => Ok(Some(location)),
            Err(e) => {
                warn!("Presign failed for {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Delete the local file; failures are logged, never fatal
    pub async fn delete_local(&self, artifact: &Artifact) {
        if let Err(e) = tokio::fs::remove_file(artifact.path()).await {
            error!("Failed to delete {}: {}", artifact.path().display(), e);
        }
    }
}

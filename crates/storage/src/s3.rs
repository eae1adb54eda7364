//! S3-compatible object store (AWS S3, Cloudflare R2, MinIO).
//!
//! Custom endpoints switch the client to path-style addressing, which every
//! S3-compatible service accepts.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::error::ObjectStoreError;
use crate::ObjectStore;

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint, e.g. `https://<account>.r2.cloudflarestorage.com`.
    pub endpoint_url: Option<String>,
    /// Static credentials. When absent the default AWS provider chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Object store backed by `aws-sdk-s3`.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from `config` and the ambient AWS environment.
    pub async fn connect(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "stemsvc-env",
            ));
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            "S3 object store configured",
        );

        Self::from_client(Client::from_conf(builder.build()), config.bucket.clone())
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(classify_sdk_error)?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let data = output.body.collect().await.map_err(|e| {
            ObjectStoreError::Transient(format!("reading object body failed: {e}"))
        })?;
        Ok(data.into_bytes().to_vec())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

/// Map an SDK failure onto the retry taxonomy.
fn classify_sdk_error<E>(err: SdkError<E, HttpResponse>) -> ObjectStoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            classify_service_error(service.err().code(), status, message)
        }
        SdkError::ConstructionFailure(_) => ObjectStoreError::Rejected(message),
        // Timeouts, connection failures and unparseable responses.
        _ => ObjectStoreError::Transient(message),
    }
}

/// Classify an S3 error by code first, HTTP status second.
fn classify_service_error(code: Option<&str>, status: u16, message: String) -> ObjectStoreError {
    match code {
        Some("NoSuchKey" | "NotFound") => return ObjectStoreError::NotFound(message),
        // A missing bucket is misconfiguration, not a missing object.
        Some("NoSuchBucket") => return ObjectStoreError::Rejected(message),
        Some(
            "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken"
            | "InvalidToken" | "AllAccessDisabled",
        ) => return ObjectStoreError::Denied(message),
        Some("SlowDown" | "RequestTimeout" | "InternalError" | "ServiceUnavailable") => {
            return ObjectStoreError::Transient(message)
        }
        _ => {}
    }

    match status {
        404 => ObjectStoreError::NotFound(message),
        401 | 403 => ObjectStoreError::Denied(message),
        408 | 429 | 500..=599 => ObjectStoreError::Transient(message),
        _ => ObjectStoreError::Rejected(message),
    }
}

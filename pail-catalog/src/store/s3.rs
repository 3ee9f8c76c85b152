//! S3-compatible blob store.
//!
//! Works against AWS S3 and MinIO-style services. Credentials come from the
//! default AWS provider chain (environment, shared credentials file, instance
//! metadata) unless a static access/secret key pair is configured.

use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{validate_key, Blob, BlobStore, PutCondition};
use crate::error::{StoreError, StoreResult};

/// Connection settings for [`S3Store`].
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    /// Endpoint override, e.g. `http://localhost:9000` for MinIO.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Per-operation timeout handed to the SDK, retries included.
    pub timeout: Duration,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    pub force_path_style: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
            timeout: Duration::from_secs(30),
            force_path_style: true,
        }
    }
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    endpoint: Option<String>,
}

impl Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl S3Store {
    /// Build a client from `settings`. Does not contact the service.
    pub async fn connect(settings: S3Settings) -> StoreResult<Self> {
        if settings.bucket.trim().is_empty() {
            return Err(StoreError::InvalidBucketName {
                bucket: settings.bucket,
            });
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let (Some(access), Some(secret)) = (&settings.access_key, &settings.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access.clone(),
                secret.clone(),
                None,
                None,
                "pail-static",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(settings.timeout)
                    .build(),
            );
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self::from_client(
            Client::from_conf(builder.build()),
            settings.bucket,
            settings.endpoint,
        ))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, bucket: String, endpoint: Option<String>) -> Self {
        Self {
            client,
            bucket,
            endpoint,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn map_error<E>(&self, err: SdkError<E>, key: &str) -> StoreError
    where
        E: ProvideErrorMetadata + Debug,
    {
        match &err {
            SdkError::ServiceError(service_err) => classify(
                Some(service_err.raw().status().as_u16()),
                err.code(),
                key,
                &self.bucket,
                err.message().unwrap_or("service error"),
            ),
            SdkError::TimeoutError(_) => {
                StoreError::unavailable(key, format!("S3 request timed out: {err:?}"))
            }
            SdkError::DispatchFailure(_) => {
                StoreError::unavailable(key, format!("S3 connection failed: {err:?}"))
            }
            _ => classify(None, err.code(), key, &self.bucket, &format!("{err:?}")),
        }
    }
}

/// Map an S3 error code and HTTP status onto a [`StoreError`].
fn classify(
    status: Option<u16>,
    code: Option<&str>,
    key: &str,
    bucket: &str,
    message: &str,
) -> StoreError {
    match (code, status) {
        (Some("NoSuchBucket"), _) => StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        },
        (Some("InvalidBucketName"), _) => StoreError::InvalidBucketName {
            bucket: bucket.to_string(),
        },
        (Some("NoSuchKey" | "NotFound"), _) | (_, Some(404)) => StoreError::not_found(key),
        (Some("AccessDenied"), _) | (_, Some(401 | 403)) => StoreError::AccessDenied {
            key: key.to_string(),
        },
        (Some("PreconditionFailed" | "ConditionalRequestConflict"), _) | (_, Some(412 | 409)) => {
            StoreError::PreconditionFailed {
                key: key.to_string(),
            }
        }
        (_, Some(status)) if status == 429 || status >= 500 => {
            StoreError::unavailable(key, format!("HTTP {status}: {message}"))
        }
        (code, status) => StoreError::unavailable(
            key,
            format!(
                "S3 error {} (HTTP {}): {message}",
                code.unwrap_or("unknown"),
                status.map_or_else(|| "-".to_string(), |s| s.to_string())
            ),
        ),
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn get(&self, key: &str) -> StoreResult<Blob> {
        validate_key(key)?;
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.map_error(e, key))?;

        let etag = response.e_tag().map(str::to_string);
        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::unavailable(key, format!("failed to read S3 body: {e}")))?
            .into_bytes();
        Ok(Blob { bytes, etag })
    }

    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        condition: PutCondition,
    ) -> StoreResult<Option<String>> {
        validate_key(key)?;
        let size = bytes.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));
        request = match &condition {
            PutCondition::Always => request,
            PutCondition::IfAbsent => request.if_none_match("*"),
            PutCondition::IfMatch(etag) if etag.starts_with('"') => request.if_match(etag),
            PutCondition::IfMatch(etag) => request.if_match(format!("\"{etag}\"")),
        };

        let output = request.send().await.map_err(|e| self.map_error(e, key))?;
        debug!(bucket = %self.bucket, key, size, ?condition, "Stored S3 object");
        Ok(output.e_tag().map(str::to_string))
    }

    async fn stat(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match self.map_error(e, key) {
                StoreError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn presign(
        &self,
        key: &str,
        ttl: Duration,
        download_name: &str,
    ) -> StoreResult<Option<Url>> {
        validate_key(key)?;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StoreError::unavailable(key, format!("invalid presign TTL: {e}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(format!("attachment; filename=\"{download_name}\""))
            .presigned(presigning)
            .await
            .map_err(|e| self.map_error(e, key))?;

        let url = Url::parse(request.uri())
            .map_err(|e| StoreError::unavailable(key, format!("presigned URL is invalid: {e}")))?;
        Ok(Some(url))
    }

    fn describe(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("s3://{} at {}", self.bucket, endpoint),
            None => format!("s3://{}", self.bucket),
        }
    }
}

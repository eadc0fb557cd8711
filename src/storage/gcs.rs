//! Google Cloud Storage backend over the JSON API.
//!
//! Only the three calls the pipeline needs are implemented: a bucket lookup
//! at construction, an object metadata lookup for [`exists`], and a simple
//! media upload for [`save`].
//!
//! Credentials are an OAuth bearer token. [`GcsOptions::from_env`] reads it
//! from `GOOGLE_OAUTH_ACCESS_TOKEN` (for example the output of
//! `gcloud auth print-access-token`) and honours `STORAGE_EMULATOR_HOST` the
//! same way the official client libraries do.
//!
//! [`exists`]: super::StorageBackend::exists
//! [`save`]: super::StorageBackend::save

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{StorageBackend, StorageError, StorageKey};
use crate::normalize::EncodedImage;
use crate::user_agent;

/// Public Cloud Storage endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const EMULATOR_HOST_ENV: &str = "STORAGE_EMULATOR_HOST";
const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Default timeout for object store calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`GcsStorage`].
#[derive(Clone, Default)]
pub struct GcsOptions {
    /// Base URL of the JSON API. Defaults to [`DEFAULT_ENDPOINT`].
    pub endpoint: Option<String>,
    /// OAuth bearer token. Requests are sent unauthenticated when absent.
    pub access_token: Option<String>,
    /// Per-request timeout. Defaults to 30 seconds.
    pub timeout: Option<Duration>,
}

impl GcsOptions {
    /// Reads `STORAGE_EMULATOR_HOST` and `GOOGLE_OAUTH_ACCESS_TOKEN`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            endpoint: env_non_empty(EMULATOR_HOST_ENV),
            access_token: env_non_empty(ACCESS_TOKEN_ENV),
            timeout: None,
        }
    }
}

impl fmt::Debug for GcsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsOptions")
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Stores images as objects in a Cloud Storage bucket.
///
/// Keys are object names: the configured prefix followed by the file name.
#[derive(Clone)]
pub struct GcsStorage {
    client: Client,
    endpoint: String,
    bucket: String,
    prefix: String,
    access_token: Option<String>,
}

impl fmt::Debug for GcsStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsStorage")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GcsStorage {
    /// Connects using [`GcsOptions::from_env`].
    ///
    /// # Errors
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect(bucket: &str, prefix: impl Into<String>) -> Result<Self, StorageError> {
        Self::connect_with(bucket, prefix, GcsOptions::from_env()).await
    }

    /// Connects to `bucket` and verifies that it is reachable.
    ///
    /// `prefix` is used verbatim in object names; pass either an empty string
    /// or a value ending in `/`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::BucketNotFound`] if the bucket does not exist
    /// - [`StorageError::BucketAccessDenied`] on 401/403
    /// - [`StorageError::Remote`] for other unexpected statuses
    /// - [`StorageError::Network`] if the endpoint cannot be reached
    #[instrument(level = "debug", skip(prefix, options))]
    pub async fn connect_with(
        bucket: &str,
        prefix: impl Into<String>,
        options: GcsOptions,
    ) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(options.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent(user_agent::default_storage_user_agent())
            .build()
            .map_err(|e| StorageError::network("client setup", e))?;

        let storage = Self {
            client,
            endpoint: normalize_endpoint(options.endpoint.as_deref()),
            bucket: bucket.to_string(),
            prefix: prefix.into(),
            access_token: options.access_token,
        };
        storage.check_bucket().await?;

        debug!(endpoint = %storage.endpoint, prefix = %storage.prefix, "cloud storage ready");
        Ok(storage)
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the object name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn check_bucket(&self) -> Result<(), StorageError> {
        let url = format!(
            "{}/storage/v1/b/{}",
            self.endpoint,
            urlencoding::encode(&self.bucket)
        );
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| StorageError::network("bucket lookup", e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::BucketNotFound {
                bucket: self.bucket.clone(),
            }),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(StorageError::BucketAccessDenied {
                    bucket: self.bucket.clone(),
                    status: status.as_u16(),
                })
            }
            status => Err(StorageError::remote(
                "bucket lookup",
                status.as_u16(),
                error_message(response).await,
            )),
        }
    }

    fn object_url(&self, name: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(name)
        )
    }

    fn upload_url(&self, name: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(name)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl StorageBackend for GcsStorage {
    fn kind(&self) -> &'static str {
        "gcs"
    }

    fn resolve(&self, relative: &str) -> StorageKey {
        StorageKey::new(format!("{}{relative}", self.prefix))
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let response = self
            .authorized(self.client.get(self.object_url(key.as_str())))
            .send()
            .await
            .map_err(|e| StorageError::network("object lookup", e))?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StorageError::remote(
                "object lookup",
                status.as_u16(),
                error_message(response).await,
            )),
        }
    }

    async fn save(&self, image: &EncodedImage, key: &StorageKey) -> Result<(), StorageError> {
        let response = self
            .authorized(self.client.post(self.upload_url(key.as_str())))
            .header(CONTENT_TYPE, image.content_type())
            .body(image.bytes().to_vec())
            .send()
            .await
            .map_err(|e| StorageError::network("upload", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::remote(
                "upload",
                status.as_u16(),
                error_message(response).await,
            ));
        }

        debug!(bucket = %self.bucket, object = %key, bytes = image.len(), "object uploaded");
        Ok(())
    }

    async fn load(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let response = self
            .authorized(self.client.get(self.object_url(key.as_str())))
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| StorageError::network("download", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::remote(
                "download",
                status.as_u16(),
                error_message(response).await,
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::network("download", e))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &StorageKey) -> Result<(), StorageError> {
        let response = self
            .authorized(self.client.delete(self.object_url(key.as_str())))
            .send()
            .await
            .map_err(|e| StorageError::network("delete", e))?;

        match response.status() {
            status if status.is_success() => {
                debug!(bucket = %self.bucket, object = %key, "object deleted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(StorageError::remote(
                "delete",
                status.as_u16(),
                error_message(response).await,
            )),
        }
    }
}

/// Extracts `error.message` from a JSON API error body.
async fn error_message(response: Response) -> Option<String> {
    let body = response.text().await.ok()?;
    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .map(|parsed| parsed.error.message)
}

/// Accepts `host:port` (emulator convention) as well as full URLs.
fn normalize_endpoint(endpoint: Option<&str>) -> String {
    let endpoint = endpoint.unwrap_or(DEFAULT_ENDPOINT).trim_end_matches('/');
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_defaults_to_public_api() {
        assert_eq!(normalize_endpoint(None), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_normalize_endpoint_accepts_emulator_host() {
        assert_eq!(
            normalize_endpoint(Some("localhost:4443")),
            "http://localhost:4443"
        );
        assert_eq!(
            normalize_endpoint(Some("http://127.0.0.1:9023/")),
            "http://127.0.0.1:9023"
        );
    }

    #[test]
    fn test_options_debug_redacts_token() {
        let options = GcsOptions {
            endpoint: None,
            access_token: Some("ya29.secret".to_string()),
            timeout: None,
        };
        let rendered = format!("{options:?}");
        assert!(!rendered.contains("ya29.secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_error_body_parses_message() {
        let body = r#"{"error":{"code":403,"message":"caller does not have storage.objects.create access","errors":[]}}"#;
        let parsed: ErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.error.message,
            "caller does not have storage.objects.create access"
        );
    }
}

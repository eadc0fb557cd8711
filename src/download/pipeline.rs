//! Per-image pipeline: cache check, fetch, normalize, persist, wait.
//!
//! This is the only place an individual image can fail. Every error is
//! returned as a [`DownloadError`] and nothing is left behind for a failed
//! image: encoding finishes before the first save, thumbnails are saved before
//! the full image and removed again if that save fails, and the storage
//! backends write atomically.
//!
//! An image that is already stored is not fetched again. Thumbnails missing
//! next to it are rebuilt from the stored copy.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::client::HttpClient;
use super::error::DownloadError;
use super::jitter::JitterDelay;
use crate::config::ThumbnailSize;
use crate::normalize::{CanonicalImage, DecodeError, EncodedImage, normalize};
use crate::storage::{StorageBackend, StorageKey};

/// One image to download.
///
/// Built from a bare URL (`&str` or `String`), in which case the storage key
/// is derived from the URL, or with an explicit destination key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    destination: Option<StorageKey>,
}

impl DownloadRequest {
    /// Creates a request whose key is derived from the URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: None,
        }
    }

    /// Stores the image under `destination` instead of the derived key.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<StorageKey>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Explicit destination, if any.
    #[must_use]
    pub fn destination(&self) -> Option<&StorageKey> {
        self.destination.as_ref()
    }
}

impl From<&str> for DownloadRequest {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for DownloadRequest {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<&String> for DownloadRequest {
    fn from(url: &String) -> Self {
        Self::new(url.as_str())
    }
}

/// A successfully stored (or already present) image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedImage {
    key: StorageKey,
    cache_hit: bool,
}

impl DownloadedImage {
    pub(crate) fn new(key: StorageKey, cache_hit: bool) -> Self {
        Self { key, cache_hit }
    }

    /// Where the image lives.
    #[must_use]
    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    /// True when the key already existed and nothing was fetched.
    #[must_use]
    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Consumes the result, returning the key.
    #[must_use]
    pub fn into_key(self) -> StorageKey {
        self.key
    }
}

/// Everything one image needs, shared by all download tasks.
#[derive(Debug)]
pub(crate) struct Pipeline {
    storage: Arc<dyn StorageBackend>,
    client: HttpClient,
    jitter: JitterDelay,
    thumbnails: Arc<[ThumbnailSize]>,
}

/// Output of the blocking encode step.
struct EncodedSet {
    full: EncodedImage,
    thumbnails: Vec<EncodedImage>,
}

impl Pipeline {
    pub(crate) fn new(
        storage: Arc<dyn StorageBackend>,
        client: HttpClient,
        jitter: JitterDelay,
        thumbnails: Vec<ThumbnailSize>,
    ) -> Self {
        Self {
            storage,
            client,
            jitter,
            thumbnails: thumbnails.into(),
        }
    }

    pub(crate) fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Runs one request to completion and logs a single outcome event.
    pub(crate) async fn run(
        &self,
        request: &DownloadRequest,
        force: bool,
    ) -> Result<DownloadedImage, DownloadError> {
        let started = Instant::now();
        let url = request.url();
        let key = request
            .destination()
            .cloned()
            .unwrap_or_else(|| self.storage.key_for(url));

        let result = self.process(url, &key, force).await;
        let elapsed_ms = started.elapsed().as_millis();

        match result {
            Ok(cache_hit) => {
                info!(
                    url = %url,
                    key = %key,
                    cache_hit,
                    elapsed_ms,
                    success = true,
                    "image stored"
                );
                Ok(DownloadedImage::new(key, cache_hit))
            }
            Err(error) => {
                warn!(
                    url = %url,
                    key = %key,
                    error_kind = error.kind(),
                    error = %error,
                    elapsed_ms,
                    success = false,
                    "image download failed"
                );
                Err(error)
            }
        }
    }

    /// Returns whether the result was a cache hit.
    async fn process(&self, url: &str, key: &StorageKey, force: bool) -> Result<bool, DownloadError> {
        if !force && self.storage.exists(key).await? {
            self.rebuild_missing_thumbnails(url, key).await?;
            return Ok(true);
        }

        let bytes = self.client.fetch(url).await?;

        let sizes = Arc::clone(&self.thumbnails);
        let encoded = tokio::task::spawn_blocking(move || encode(&bytes, &sizes))
            .await
            .map_err(|source| DecodeError::Interrupted { source })??;

        // Thumbnails first: a present full image implies its thumbnails.
        let mut written = Vec::with_capacity(encoded.thumbnails.len());
        for (size, thumbnail) in self.thumbnails.iter().zip(&encoded.thumbnails) {
            let thumbnail_key = self.storage.thumbnail_key_for(url, size.name());
            if let Err(error) = self.storage.save(thumbnail, &thumbnail_key).await {
                self.discard(&written).await;
                return Err(error.into());
            }
            written.push(thumbnail_key);
        }
        if let Err(error) = self.storage.save(&encoded.full, key).await {
            self.discard(&written).await;
            return Err(error.into());
        }

        self.jitter.wait().await;
        Ok(false)
    }

    /// Writes the configured thumbnails that are absent for an already stored
    /// image, decoding the stored copy instead of fetching the URL again.
    async fn rebuild_missing_thumbnails(
        &self,
        url: &str,
        key: &StorageKey,
    ) -> Result<(), DownloadError> {
        let mut missing = Vec::new();
        for size in self.thumbnails.iter() {
            let thumbnail_key = self.storage.thumbnail_key_for(url, size.name());
            if !self.storage.exists(&thumbnail_key).await? {
                missing.push((size.clone(), thumbnail_key));
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let stored = self.storage.load(key).await?;
        let sizes: Vec<ThumbnailSize> = missing.iter().map(|(size, _)| size.clone()).collect();
        let thumbnails = tokio::task::spawn_blocking(move || encode_thumbnails(&stored, &sizes))
            .await
            .map_err(|source| DecodeError::Interrupted { source })??;

        for ((_, thumbnail_key), thumbnail) in missing.iter().zip(&thumbnails) {
            self.storage.save(thumbnail, thumbnail_key).await?;
        }
        debug!(url, key = %key, rebuilt = missing.len(), "thumbnails rebuilt from stored image");
        Ok(())
    }

    /// Removes thumbnails written for an image whose full save failed.
    async fn discard(&self, keys: &[StorageKey]) {
        for key in keys {
            if let Err(error) = self.storage.delete(key).await {
                warn!(key = %key, error = %error, "failed to remove orphaned thumbnail");
            }
        }
    }
}

/// Decodes once, then encodes the full image and every thumbnail.
fn encode(bytes: &[u8], sizes: &[ThumbnailSize]) -> Result<EncodedSet, DecodeError> {
    let canonical = normalize(bytes)?;
    Ok(EncodedSet {
        thumbnails: thumbnails_of(&canonical, sizes)?,
        full: canonical.to_jpeg()?,
    })
}

/// Decodes a stored image and encodes only the requested thumbnails.
fn encode_thumbnails(
    bytes: &[u8],
    sizes: &[ThumbnailSize],
) -> Result<Vec<EncodedImage>, DecodeError> {
    thumbnails_of(&normalize(bytes)?, sizes)
}

fn thumbnails_of(
    canonical: &CanonicalImage,
    sizes: &[ThumbnailSize],
) -> Result<Vec<EncodedImage>, DecodeError> {
    sizes
        .iter()
        .map(|size| {
            canonical
                .thumbnail(size.max_width(), size.max_height())
                .to_jpeg()
        })
        .collect()
}

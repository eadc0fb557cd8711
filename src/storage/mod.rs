//! Storage backends for normalized images.
//!
//! Every downloaded image is stored under a [`StorageKey`] derived from the
//! SHA-1 of its URL, so the same URL always maps to the same location and an
//! existing key doubles as the download cache.
//!
//! # Backends
//!
//! - [`LocalStorage`] - a directory on the local filesystem
//! - [`GcsStorage`] - a Google Cloud Storage bucket, optionally under a prefix
//!
//! [`resolve_storage_backend`] picks one from a destination string:
//! `gs://bucket/prefix` selects Cloud Storage, any other `scheme://` is
//! rejected, and everything else is treated as a local path.
//!
//! # Example
//!
//! ```no_run
//! use imgdl_core::storage::resolve_storage_backend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = resolve_storage_backend("/tmp/images").await?;
//! let key = storage.key_for("https://example.com/cat.png");
//! println!("cached: {}", storage.exists(&key).await?);
//! # Ok(())
//! # }
//! ```

mod error;
mod gcs;
mod local;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha1::{Digest, Sha1};
use tracing::{debug, instrument};

use crate::config::expand_home;
use crate::normalize::EncodedImage;

pub use error::StorageError;
pub use gcs::{GcsOptions, GcsStorage};
pub use local::LocalStorage;

/// Extension appended to every stored image.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Sub-directory holding thumbnail variants, one folder per size name.
pub const THUMBNAILS_DIR: &str = "thumbs";

/// Location of one stored image inside a backend.
///
/// For [`LocalStorage`] this is a filesystem path; for [`GcsStorage`] it is
/// the object name inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Wraps an already resolved location.
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Returns the location as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key, returning the location string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for StorageKey {
    fn from(location: String) -> Self {
        Self(location)
    }
}

impl From<&str> for StorageKey {
    fn from(location: &str) -> Self {
        Self(location.to_string())
    }
}

/// Returns the file name an image URL is stored under.
///
/// The name is the hex SHA-1 of the URL's UTF-8 bytes plus `.jpg`. It depends
/// on nothing but the URL.
#[must_use]
pub fn filename_for_url(url: &str) -> String {
    let digest = Sha1::digest(url.as_bytes());
    format!("{}.{IMAGE_EXTENSION}", hex::encode(digest))
}

/// A place normalized images can be written to.
///
/// Implementations must be safe to share between concurrent download tasks.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Short backend name used in log records ("local", "gcs").
    fn kind(&self) -> &'static str;

    /// Maps a path relative to the backend root to a full key.
    fn resolve(&self, relative: &str) -> StorageKey;

    /// Returns true if something is already stored under `key`.
    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Stores an encoded image under `key`, replacing any previous content.
    ///
    /// Either the whole image becomes visible under `key` or nothing does.
    async fn save(&self, image: &EncodedImage, key: &StorageKey) -> Result<(), StorageError>;

    /// Reads back the bytes stored under `key`.
    async fn load(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError>;

    /// Removes whatever is stored under `key`. A missing key is not an error.
    async fn delete(&self, key: &StorageKey) -> Result<(), StorageError>;

    /// Key of the full-size image for `url`.
    fn key_for(&self, url: &str) -> StorageKey {
        self.resolve(&filename_for_url(url))
    }

    /// Key of the thumbnail named `size_name` for `url`.
    fn thumbnail_key_for(&self, url: &str, size_name: &str) -> StorageKey {
        self.resolve(&format!(
            "{THUMBNAILS_DIR}/{size_name}/{}",
            filename_for_url(url)
        ))
    }
}

/// Selects and initializes the backend named by `store_path`.
///
/// # Errors
///
/// - [`StorageError::UnsupportedScheme`] for any `scheme://` other than `gs`
///   or `file`, before any IO happens
/// - [`StorageError::InvalidLocation`] for `gs://` without a bucket name
/// - bucket errors from [`GcsStorage::connect`]
/// - [`StorageError::Io`] if a local directory cannot be created
#[instrument(level = "debug")]
pub async fn resolve_storage_backend(
    store_path: &str,
) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match split_scheme(store_path) {
        Some(("gs", location)) => {
            let (bucket, prefix) = parse_bucket_location(store_path, location)?;
            debug!(bucket, prefix, "using cloud storage backend");
            let storage = GcsStorage::connect(bucket, prefix).await?;
            Ok(Arc::new(storage))
        }
        Some(("file", path)) => Ok(Arc::new(LocalStorage::new(expand_home(path))?)),
        Some((scheme, _)) => Err(StorageError::UnsupportedScheme {
            scheme: scheme.to_string(),
        }),
        None => Ok(Arc::new(LocalStorage::new(expand_home(store_path))?)),
    }
}

/// Splits `scheme://rest`, accepting only RFC 3986 scheme characters so
/// that local paths containing `://` deeper in are not misread.
fn split_scheme(location: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = location.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Splits `bucket[/prefix]` into the bucket name and a prefix that is either
/// empty or ends with `/`.
fn parse_bucket_location<'a>(
    original: &str,
    location: &'a str,
) -> Result<(&'a str, String), StorageError> {
    let (bucket, path) = location.split_once('/').unwrap_or((location, ""));
    if bucket.is_empty() {
        return Err(StorageError::InvalidLocation {
            location: original.to_string(),
            reason: "missing bucket name",
        });
    }
    let mut prefix = path.to_string();
    if !prefix.is_empty() && !prefix.ends_with('/') {
        prefix.push('/');
    }
    Ok((bucket, prefix))
}

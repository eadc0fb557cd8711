//! Error types for the download module.
//!
//! [`FetchError`] covers the network request alone. [`DownloadError`] is
//! what the per-image pipeline returns: whichever step failed, with the
//! step's own error as the source.

use thiserror::Error;

use crate::normalize::DecodeError;
use crate::storage::StorageError;

/// Errors that can occur while fetching image bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before the body was received.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body exceeded the size limit.
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge {
        /// The URL whose body was too large.
        url: String,
        /// The limit in bytes.
        limit: u64,
    },

    /// The provided URL is malformed or not http(s).
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error, classifying reqwest timeouts as [`Self::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a body-too-large error.
    pub fn too_large(url: impl Into<String>, limit: u64) -> Self {
        Self::TooLarge {
            url: url.into(),
            limit,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

// No From<reqwest::Error> for FetchError: every variant needs the URL, which
// reqwest errors do not always carry. Use the constructors above.

/// Failure of one image's download pipeline.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The image could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The payload could not be decoded or re-encoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The storage backend rejected a lookup or write.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DownloadError {
    /// Stable label for the failing step, used as a structured log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Decode(_) => "decode",
            Self::Storage(_) => "storage",
        }
    }
}

//! Error types for storage backends.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving, probing, or writing to a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local filesystem failure (create directory, write, rename).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The destination descriptor names a scheme no backend handles.
    #[error("unsupported storage scheme '{scheme}://'")]
    UnsupportedScheme {
        /// The scheme prefix, without `://`.
        scheme: String,
    },

    /// The destination descriptor is syntactically unusable.
    #[error("invalid storage location '{location}': {reason}")]
    InvalidLocation {
        /// The location as supplied.
        location: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The remote bucket does not exist.
    #[error("bucket '{bucket}' does not exist")]
    BucketNotFound {
        /// Bucket name.
        bucket: String,
    },

    /// The remote bucket exists but the credentials cannot access it.
    #[error("no permission to access bucket '{bucket}' (HTTP {status})")]
    BucketAccessDenied {
        /// Bucket name.
        bucket: String,
        /// HTTP status returned by the object store.
        status: u16,
    },

    /// The object store answered with an unexpected status.
    #[error("object store {operation} failed with HTTP {status}{}", format_message(.message.as_deref()))]
    Remote {
        /// The operation being attempted (e.g. "upload").
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, when the store sent one.
        message: Option<String>,
    },

    /// Transport failure while talking to the object store.
    #[error("object store {operation} failed: {source}")]
    Network {
        /// The operation being attempted.
        operation: &'static str,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },
}

fn format_message(message: Option<&str>) -> String {
    message.map(|m| format!(": {m}")).unwrap_or_default()
}

impl StorageError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an object store transport error.
    pub fn network(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Network { operation, source }
    }

    /// Creates an unexpected-status error.
    pub fn remote(operation: &'static str, status: u16, message: Option<String>) -> Self {
        Self::Remote {
            operation,
            status,
            message,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_scheme_display() {
        let error = StorageError::UnsupportedScheme {
            scheme: "s3".to_string(),
        };
        assert_eq!(error.to_string(), "unsupported storage scheme 's3://'");
    }

    #[test]
    fn test_bucket_errors_are_distinguishable() {
        let missing = StorageError::BucketNotFound {
            bucket: "images".to_string(),
        };
        let denied = StorageError::BucketAccessDenied {
            bucket: "images".to_string(),
            status: 403,
        };
        assert!(missing.to_string().contains("does not exist"));
        assert!(denied.to_string().contains("no permission"));
        assert!(denied.to_string().contains("403"));
    }

    #[test]
    fn test_remote_display_includes_message_when_present() {
        let with = StorageError::remote("upload", 500, Some("backend error".to_string()));
        assert_eq!(
            with.to_string(),
            "object store upload failed with HTTP 500: backend error"
        );

        let without = StorageError::remote("upload", 503, None);
        assert_eq!(without.to_string(), "object store upload failed with HTTP 503");
    }

    #[test]
    fn test_io_display_includes_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = StorageError::io("/tmp/images/a.jpg", io_error);
        assert!(error.to_string().contains("/tmp/images/a.jpg"));
    }
}

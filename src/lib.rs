//! Image Downloader Core Library
//!
//! This library downloads large lists of image URLs concurrently, normalizes
//! every image to an opaque RGB JPEG, and stores it under a key derived from
//! its URL, on the local filesystem or in a Google Cloud Storage bucket.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Validated downloader settings
//! - [`download`] - HTTP fetching, the per-image pipeline, and batch orchestration
//! - [`input`] - URL list parsing
//! - [`normalize`] - Image decoding, alpha flattening, thumbnails, JPEG encoding
//! - [`storage`] - Storage key derivation and the local/GCS backends
//! - [`user_agent`] - Default User-Agent strings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod input;
pub mod normalize;
pub mod storage;
pub mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, DownloaderConfig, DownloaderConfigBuilder, ThumbnailSize};
pub use download::{
    BatchReport, DownloadError, DownloadRequest, DownloadStats, DownloadedImage, FetchError,
    HttpClient, ImageDownloader,
};
pub use input::parse_url_list;
pub use normalize::{CanonicalImage, DecodeError, EncodedImage, normalize};
pub use storage::{
    LocalStorage, StorageBackend, StorageError, StorageKey, filename_for_url,
    resolve_storage_backend,
};

//! Fetching, processing, and storing images.
//!
//! This module turns image URLs into stored, normalized JPEGs.
//!
//! # Features
//!
//! - Concurrent batches bounded by a worker semaphore
//! - Per-request timeouts and a randomly chosen proxy per request
//! - Existence cache: already stored images are never fetched again
//! - Optional thumbnails and a random wait after every real fetch
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use imgdl_core::{DownloaderConfig, ImageDownloader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ImageDownloader::new(DownloaderConfig::default()).await?;
//! let key = downloader.download("https://example.com/cat.png", false).await?;
//! println!("Stored: {key}");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod jitter;
mod pipeline;

pub use client::HttpClient;
pub use constants::{CONNECT_TIMEOUT, MAX_IMAGE_BYTES};
pub use engine::{BatchReport, DownloadStats, ImageDownloader};
pub use error::{DownloadError, FetchError};
pub use jitter::JitterDelay;
pub use pipeline::{DownloadRequest, DownloadedImage};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.

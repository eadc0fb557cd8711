//! Batch orchestrator: runs the per-image pipeline over many URLs at once.
//!
//! # Overview
//!
//! [`ImageDownloader`] owns the storage backend, the HTTP client pool, and a
//! semaphore sized to the configured worker count. [`ImageDownloader::download_batch`]
//! pulls requests lazily from any iterator, spawns one task per image, and
//! returns a [`BatchReport`] whose keys line up with the input.
//!
//! # Example
//!
//! ```no_run
//! use imgdl_core::{DownloaderConfig, ImageDownloader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloaderConfig::builder()
//!     .store_path("/tmp/images")
//!     .worker_count(8)
//!     .build()?;
//! let downloader = ImageDownloader::new(config).await?;
//! let report = downloader
//!     .download_batch(["https://example.com/a.png", "https://example.com/b.png"], false)
//!     .await;
//! println!("stored {}, failed {}", report.succeeded(), report.failed());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::error::DownloadError;
use super::jitter::JitterDelay;
use super::pipeline::{DownloadRequest, DownloadedImage, Pipeline};
use crate::config::{ConfigError, DownloaderConfig};
use crate::storage::{StorageBackend, StorageKey, resolve_storage_backend};

/// Counters shared by the tasks of one batch.
///
/// Uses atomic counters so concurrent download tasks can update them
/// without locking.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Images stored or found in the cache.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Images that failed, including panicked tasks.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Completed images that were already present.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::SeqCst)
    }

    /// Returns the total number of items processed (completed + failed).
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    fn record(&self, outcome: &Result<DownloadedImage, DownloadError>) {
        match outcome {
            Ok(image) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                if image.cache_hit() {
                    self.cache_hits.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(_) => self.increment_failed(),
        }
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Result of [`ImageDownloader::download_batch`].
///
/// `keys()[i]` is the storage key for the i-th input, or `None` if that
/// image failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    keys: Vec<Option<StorageKey>>,
    failed: usize,
    cache_hits: usize,
}

impl BatchReport {
    /// Number of inputs.
    #[must_use]
    pub fn total(&self) -> usize {
        self.keys.len()
    }

    /// Number of inputs with a key.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.total() - self.failed
    }

    /// Number of inputs without a key.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Number of inputs that were already stored.
    #[must_use]
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    /// Keys in input order.
    #[must_use]
    pub fn keys(&self) -> &[Option<StorageKey>] {
        &self.keys
    }

    /// Consumes the report, returning the keys in input order.
    #[must_use]
    pub fn into_keys(self) -> Vec<Option<StorageKey>> {
        self.keys
    }
}

/// Concurrent image downloader.
///
/// # Concurrency Model
///
/// - Each image runs in its own Tokio task
/// - A semaphore permit is acquired before the next input is pulled, so at
///   most `worker_count` requests are in flight or buffered
/// - Permits are released automatically when a task finishes (RAII)
/// - A failed or panicked task never affects the others
///
/// Cloning is cheap and clones share the same worker pool.
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
    worker_count: usize,
    show_progress: bool,
}

impl ImageDownloader {
    /// Creates a downloader, resolving the storage backend from
    /// `config.store_path()`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Storage`] if the destination cannot be used
    /// (unsupported scheme, missing bucket, unwritable directory) and
    /// [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    #[instrument(skip(config), fields(store_path = %config.store_path()))]
    pub async fn new(config: DownloaderConfig) -> Result<Self, ConfigError> {
        let storage = resolve_storage_backend(config.store_path()).await?;
        Self::with_storage(config, storage)
    }

    /// Creates a downloader that writes to an existing backend.
    /// `config.store_path()` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the HTTP client cannot be built.
    pub fn with_storage(
        config: DownloaderConfig,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self, ConfigError> {
        let client = HttpClient::from_config(&config)?;
        let jitter = JitterDelay::new(config.min_wait(), config.max_wait());

        debug!(
            storage = storage.kind(),
            worker_count = config.worker_count(),
            proxies = client.proxy_count(),
            thumbnails = config.thumbnails().len(),
            "creating image downloader"
        );

        Ok(Self {
            pipeline: Arc::new(Pipeline::new(
                storage,
                client,
                jitter,
                config.thumbnails().to_vec(),
            )),
            semaphore: Arc::new(Semaphore::new(config.worker_count())),
            worker_count: config.worker_count(),
            show_progress: config.show_progress(),
        })
    }

    /// Returns the configured worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Returns the storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        self.pipeline.storage()
    }

    /// Downloads a single image and returns its key.
    ///
    /// With `force` the cache check is skipped and the image is fetched
    /// and overwritten even if it already exists.
    ///
    /// # Errors
    ///
    /// Returns the [`DownloadError`] of whichever step failed.
    pub async fn download(&self, url: &str, force: bool) -> Result<StorageKey, DownloadError> {
        self.download_request(&DownloadRequest::new(url), force)
            .await
            .map(DownloadedImage::into_key)
    }

    /// Downloads a single request, reporting whether it was a cache hit.
    ///
    /// # Errors
    ///
    /// Returns the [`DownloadError`] of whichever step failed.
    pub async fn download_request(
        &self,
        request: &DownloadRequest,
        force: bool,
    ) -> Result<DownloadedImage, DownloadError> {
        // Only fails if the semaphore is closed, which never happens here.
        let _permit = self.semaphore.acquire().await.ok();
        self.pipeline.run(request, force).await
    }

    /// Downloads every request and returns keys in input order.
    ///
    /// Never fails: per-image failures become `None` slots and are counted
    /// in [`BatchReport::failed`]. The input is consumed lazily, one item per
    /// free worker.
    #[instrument(skip(self, requests), fields(workers = self.worker_count))]
    pub async fn download_batch<I>(&self, requests: I, force: bool) -> BatchReport
    where
        I: IntoIterator,
        I::Item: Into<DownloadRequest>,
    {
        let started = Instant::now();
        let mut requests = requests.into_iter();
        let progress = self.progress_bar(requests.size_hint());
        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::new();

        loop {
            // Acquire before pulling so the input is never read ahead of the pool.
            // Only fails if the semaphore is closed, which never happens here.
            let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok();

            let Some(request) = requests.next() else {
                break;
            };
            let request: DownloadRequest = request.into();

            let pipeline = Arc::clone(&self.pipeline);
            let stats = Arc::clone(&stats);
            let progress = progress.clone();

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;

                let outcome = pipeline.run(&request, force).await;
                stats.record(&outcome);
                progress.inc(1);
                outcome.ok().map(DownloadedImage::into_key)
            }));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        // Handles are pushed in input order, so awaiting them in order keeps
        // each key in its input slot.
        let mut keys = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(key) => keys.push(key),
                Err(e) => {
                    warn!(index, error_kind = "task", error = %e, success = false, "download task panicked");
                    stats.increment_failed();
                    progress.inc(1);
                    keys.push(None);
                }
            }
        }
        progress.finish_and_clear();

        let report = BatchReport {
            keys,
            failed: stats.failed(),
            cache_hits: stats.cache_hits(),
        };
        log_summary(&report, started.elapsed());
        report
    }

    fn progress_bar(&self, size_hint: (usize, Option<usize>)) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = match size_hint {
            (lower, Some(upper)) if lower == upper => {
                let bar = ProgressBar::new(lower as u64);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} images ({per_sec})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            _ => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} images ({per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner
            }
        };
        progress.enable_steady_tick(Duration::from_millis(120));
        progress
    }
}

fn log_summary(report: &BatchReport, elapsed: Duration) {
    let total = report.total();
    let failed = report.failed();
    if failed > 0 {
        warn!(failed, total, "{failed} of {total} images failed to download");
    }
    info!(
        total,
        succeeded = report.succeeded(),
        cache_hits = report.cache_hits(),
        failed,
        elapsed_ms = elapsed.as_millis(),
        "batch complete"
    );
}

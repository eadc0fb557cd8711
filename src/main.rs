//! CLI entry point for the image downloader.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use imgdl_core::{DownloaderConfig, ImageDownloader, ThumbnailSize, parse_url_list};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod app_config;
mod cli;

use app_config::{FileConfig, load_file_config};
use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = load_file_config(args.config.as_deref())?;
    let file_config = loaded.config.unwrap_or_default();

    // Keep the guard alive so buffered file logs are flushed on exit
    let log_file = args.log_file.clone().or_else(|| file_config.log_file.clone());
    let _log_guard = init_tracing(&args, log_file.as_deref())?;

    debug!(?args, config_path = ?loaded.path, "CLI arguments parsed");

    let Some(input_text) = read_input(args.urls_file.as_deref())? else {
        info!("No input provided. Pass a URL list file or pipe URLs via stdin.");
        info!("Example: imgdl urls.txt -o ./images");
        return Ok(());
    };

    let urls = parse_url_list(&input_text);
    if urls.is_empty() {
        info!("No URLs found in input");
        return Ok(());
    }
    info!(urls = urls.len(), "Parsed input");

    let config = build_config(&args, &file_config)?;
    let downloader = ImageDownloader::new(config)
        .await
        .context("Failed to initialize the downloader")?;

    let report = downloader.download_batch(urls, args.force).await;

    if !args.quiet {
        println!(
            "Downloaded {} of {} images ({} already stored, {} failed)",
            report.succeeded(),
            report.total(),
            report.cache_hits(),
            report.failed()
        );
    }

    Ok(())
}

/// Installs the stderr subscriber and, with a log file, a JSON-lines layer.
///
/// Priority: `RUST_LOG` env var > quiet flag > verbose/debug flags > default (info)
fn init_tracing(args: &Args, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbosity() {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path '{}' has no file name", path.display()))?;
            let dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory '{}'", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Reads the URL list from a file, or from stdin for `-` or piped input.
///
/// Returns `None` when there is no file and stdin is a terminal.
fn read_input(urls_file: Option<&Path>) -> Result<Option<String>> {
    match urls_file {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("Failed to read URL list '{}'", path.display())),
        Some(_) => read_stdin().map(Some),
        None if !io::stdin().is_terminal() => read_stdin().map(Some),
        None => Ok(None),
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read URL list from stdin")?;
    Ok(buffer)
}

/// Merges CLI flags over file config over built-in defaults.
fn build_config(args: &Args, file: &FileConfig) -> Result<DownloaderConfig> {
    let mut builder = DownloaderConfig::builder();

    if let Some(store_path) = args.store_path.as_ref().or(file.store_path.as_ref()) {
        builder = builder.store_path(store_path.as_str());
    }
    if let Some(workers) = args
        .workers
        .and_then(|workers| usize::try_from(workers).ok())
        .or(file.workers)
    {
        builder = builder.worker_count(workers);
    }
    if let Some(timeout) = args.timeout.or(file.timeout_secs) {
        builder = builder.timeout(secs("timeout", timeout)?);
    }
    if let Some(min_wait) = args.min_wait.or(file.min_wait_secs) {
        builder = builder.min_wait(secs("min-wait", min_wait)?);
    }
    if let Some(max_wait) = args.max_wait.or(file.max_wait_secs) {
        builder = builder.max_wait(secs("max-wait", max_wait)?);
    }
    if !args.proxies.is_empty() {
        builder = builder.proxies(args.proxies.iter().cloned());
    } else if let Some(proxies) = &file.proxies {
        builder = builder.proxies(proxies.iter().cloned());
    }
    if let Some(user_agent) = args.user_agent.as_ref().or(file.user_agent.as_ref()) {
        builder = builder.user_agent(user_agent.as_str());
    }
    for (name, value) in &args.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let mut thumbnails = Vec::new();
    if args.thumbs || file.thumbs.unwrap_or(false) {
        thumbnails.extend(ThumbnailSize::defaults());
    }
    thumbnails.extend(
        args.thumb_sizes
            .iter()
            .map(|&size| ThumbnailSize::new(size.to_string(), size, size)),
    );
    builder = builder.thumbnails(thumbnails);

    let show_progress = !args.no_progress
        && !args.quiet
        && file.progress.unwrap_or(true)
        && io::stderr().is_terminal();
    builder = builder.show_progress(show_progress);

    builder.build().context("Invalid downloader configuration")
}

fn secs(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("Invalid --{name} value {value}: not a valid duration"))
}

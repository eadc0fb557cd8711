//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Bulk image downloader.
///
/// Downloads every URL in a list, converts each image to an RGB JPEG, and
/// stores it under a name derived from the URL's SHA-1, either in a local
/// directory or in a Google Cloud Storage bucket (`gs://bucket/prefix`).
#[derive(Parser, Debug)]
#[command(name = "imgdl")]
#[command(author, version, about)]
pub struct Args {
    /// Text file with one URL per line ("-" or omitted reads stdin)
    #[arg(value_name = "URLS_FILE")]
    pub urls_file: Option<PathBuf>,

    /// Root path where images are stored (directory or gs://bucket/prefix)
    #[arg(short = 'o', long)]
    pub store_path: Option<String>,

    /// Number of images processed at once [default: 10 per CPU]
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub workers: Option<u32>,

    /// Request timeout in seconds [default: 5]
    #[arg(long, value_parser = parse_positive_secs)]
    pub timeout: Option<f64>,

    /// Minimum wait in seconds after each downloaded image
    #[arg(long, value_parser = parse_non_negative_secs)]
    pub min_wait: Option<f64>,

    /// Maximum wait in seconds after each downloaded image
    #[arg(long, value_parser = parse_non_negative_secs)]
    pub max_wait: Option<f64>,

    /// Proxy URL; repeat to build a pool picked from at random
    #[arg(long = "proxy", value_name = "URL")]
    pub proxies: Vec<String>,

    /// User-Agent sent with image requests
    #[arg(short = 'u', long)]
    pub user_agent: Option<String>,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header_arg)]
    pub headers: Vec<(String, String)>,

    /// Download even if the image is already stored
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Also store the default thumbnails (small 50x50, big 200x200)
    #[arg(long)]
    pub thumbs: bool,

    /// Store a square thumbnail of this size, named after it (repeatable)
    #[arg(long = "thumb-size", value_name = "PIXELS", value_parser = clap::value_parser!(u32).range(1..))]
    pub thumb_sizes: Vec<u32>,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Also write JSON logs to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Config file [default: $XDG_CONFIG_HOME/imgdl/config.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Activate debug output (same as -v)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Verbosity with `--debug` counted as one `-v`.
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        if self.debug {
            self.verbose.max(1)
        } else {
            self.verbose
        }
    }
}

fn parse_positive_secs(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("'{raw}' is not a number"))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("'{raw}' must be greater than zero"))
    }
}

fn parse_non_negative_secs(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|_| format!("'{raw}' is not a number"))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(format!("'{raw}' must be zero or greater"))
    }
}

fn parse_header_arg(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once(':') else {
        return Err(format!("'{raw}' is not in \"Name: value\" form"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("'{raw}' has an empty header name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

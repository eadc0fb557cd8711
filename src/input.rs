//! URL list parsing.
//!
//! Lists are plain text with one URL per line. Blank lines and lines
//! starting with `#` are skipped, and a line holding several
//! whitespace-separated URLs yields each of them in order.
//!
//! # Example
//!
//! ```
//! use imgdl_core::parse_url_list;
//!
//! let urls = parse_url_list("# cats\nhttps://example.com/a.png\n\nhttps://example.com/b.png\n");
//! assert_eq!(urls, ["https://example.com/a.png", "https://example.com/b.png"]);
//! ```

use tracing::debug;

/// Extracts URLs from a list, preserving their order.
///
/// URLs are not validated here. An invalid entry still occupies its slot and
/// fails individually when it is downloaded.
#[tracing::instrument(skip(input), fields(input_len = input.len()))]
#[must_use]
pub fn parse_url_list(input: &str) -> Vec<&str> {
    let urls: Vec<&str> = input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .collect();

    debug!(count = urls.len(), "parsed URL list");
    urls
}

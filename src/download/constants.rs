//! Constants for the download module (timeouts, size limits).

use std::time::Duration;

/// Upper bound on the TCP/TLS connect phase. The overall request timeout
/// from the configuration still applies when it is shorter.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest response body accepted as an image (64 MiB).
pub const MAX_IMAGE_BYTES: u64 = 64 * 1024 * 1024;

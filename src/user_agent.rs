//! User-Agent strings for image and object store traffic.
//!
//! Image hosts frequently refuse obvious bot agents, so image requests default
//! to a desktop browser string. Object store calls identify the tool.

/// Default User-Agent for image requests.
pub const DEFAULT_IMAGE_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:55.0) Gecko/20100101 Firefox/55.0";

/// User-Agent for Cloud Storage API calls (identifies the tool and version).
#[must_use]
pub(crate) fn default_storage_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("imgdl/{version}")
}

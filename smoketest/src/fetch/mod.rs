//! Retrieval of release resources into the local cache.
//!
//! A [`ReleaseSource`] hides whether a URL points at the local filesystem or
//! an HTTP server; the downloader, directory listing and crawler are written
//! against it.

pub mod crawl;
pub mod download;
pub mod listing;
pub mod source;

pub use crawl::crawl;
pub use download::{CachePolicy, Fetcher};
pub use listing::DirEntry;
pub use source::{HttpSource, ReleaseSource, read_text};

use std::path::PathBuf;
use thiserror::Error;

/// Errors arising while fetching or listing release resources.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The resource could not be retrieved, even after a retry.
    #[error("failed to download {url}: {reason}")]
    Download {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The resource does not exist.
    #[error("not found: {url}")]
    NotFound {
        /// The URL that was requested.
        url: String,
    },

    /// The URL cannot be interpreted.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// I/O error writing into the cache.
    #[error("I/O error writing {}: {source}", path.display())]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Run `attempt`, running it once more if it fails.
///
/// Every failure is retried, including a missing resource; only a malformed
/// URL is returned straight away. The second attempt's error is returned.
pub(crate) fn retry_once<T>(
    url: &str,
    mut attempt: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    match attempt() {
        Err(invalid @ FetchError::InvalidUrl { .. }) => Err(invalid),
        Err(first) => {
            log::warn!("retrying {url} after: {first}");
            attempt()
        }
        ok => ok,
    }
}

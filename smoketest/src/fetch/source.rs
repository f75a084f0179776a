//! URL access for release resources.
//!
//! Release candidates are staged either on a web server or in a local
//! directory (`file:` URLs or bare paths). [`HttpSource`] handles both behind
//! the [`ReleaseSource`] trait so the rest of the pipeline never needs to know
//! which one it is talking to.

use super::{FetchError, retry_once};
use super::listing::{self, DirEntry};
use std::io::Read;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Timeout for establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the response head once a request has been sent.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(120);

/// Access to published release resources.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseSource {
    /// Open a streamed reader over the resource at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::NotFound`] if the resource does not exist and
    /// [`FetchError::Download`] for any other failure.
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError>;

    /// List the entries of the directory at `url`.
    ///
    /// Directory entries carry a trailing `/` in their name; the parent
    /// directory entry is never returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be retrieved.
    fn list(&self, url: &str) -> Result<Vec<DirEntry>, FetchError>;

    /// Resolve a single redirect on `url`, returning the final location.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be reached.
    fn resolve(&self, url: &str) -> Result<String, FetchError>;
}

/// Source backed by `ureq` for HTTP(S) and the filesystem for local URLs.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpSource;

impl ReleaseSource for HttpSource {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FetchError> {
        if let Some(path) = local_path(url)? {
            return match std::fs::File::open(&path) {
                Ok(file) => Ok(Box::new(file)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound {
                    url: url.to_owned(),
                }),
                Err(e) => Err(FetchError::Download {
                    url: url.to_owned(),
                    reason: e.to_string(),
                }),
            };
        }
        let response = http_agent()
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        Ok(Box::new(response.into_body().into_reader()))
    }

    fn list(&self, url: &str) -> Result<Vec<DirEntry>, FetchError> {
        match local_path(url)? {
            Some(path) => listing::list_local(&path, url),
            None => listing::parse_index(&read_text(self, url)?, url),
        }
    }

    fn resolve(&self, url: &str) -> Result<String, FetchError> {
        if local_path(url)?.is_some() {
            return Ok(url.to_owned());
        }
        use ureq::ResponseExt;
        let response = http_agent()
            .head(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let resolved = response.get_uri().to_string();
        if resolved != url {
            log::debug!("resolved {url} to {resolved}");
        }
        Ok(resolved)
    }
}

/// Read the whole resource at `url` as UTF-8 text, retrying once on failure.
///
/// # Errors
///
/// Returns an error if both attempts fail to open the resource or read it as
/// valid UTF-8.
pub fn read_text(source: &dyn ReleaseSource, url: &str) -> Result<String, FetchError> {
    retry_once(url, || {
        let mut text = String::new();
        source
            .open(url)?
            .read_to_string(&mut text)
            .map_err(|e| FetchError::Download {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(text)
    })
}

/// Map a URL onto the local filesystem, if it names a local resource.
///
/// `file:` URLs are converted to paths; strings without a scheme are taken to
/// be paths already.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] for a `file:` URL that does not name an
/// absolute path.
pub fn local_path(url: &str) -> Result<Option<PathBuf>, FetchError> {
    if url.starts_with("file:") {
        let parsed = url::Url::parse(&listing::normalize_file_url(url)).map_err(|e| {
            FetchError::InvalidUrl {
                url: url.to_owned(),
                reason: e.to_string(),
            }
        })?;
        let path = parsed.to_file_path().map_err(|()| FetchError::InvalidUrl {
            url: url.to_owned(),
            reason: "not an absolute local path".to_owned(),
        })?;
        return Ok(Some(path));
    }
    if url.contains("://") {
        Ok(None)
    } else {
        Ok(Some(PathBuf::from(url)))
    }
}

/// Shared `ureq` agent with timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(RESPONSE_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(404) => FetchError::NotFound {
            url: url.to_owned(),
        },
        other => FetchError::Download {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

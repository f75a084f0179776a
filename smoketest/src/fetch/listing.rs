//! Directory listings, local or HTTP, normalized to `(name, url)` pairs.

use super::FetchError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a href="(.*?)">(.*?)</a>"#).expect("href regex is valid"));

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Display name; directories end with `/`.
    pub name: String,
    /// Absolute URL of the entry.
    pub url: String,
}

impl DirEntry {
    /// Whether the entry names a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Rewrite `file:/path` into the canonical `file:///path` form.
///
/// # Examples
///
/// ```
/// use smoketest::fetch::listing::normalize_file_url;
///
/// assert_eq!(normalize_file_url("file:/tmp/rc"), "file:///tmp/rc");
/// assert_eq!(normalize_file_url("file:///tmp/rc"), "file:///tmp/rc");
/// ```
#[must_use]
pub fn normalize_file_url(url: &str) -> String {
    match url.strip_prefix("file:/") {
        Some(rest) if !rest.starts_with('/') => format!("file:///{rest}"),
        _ => url.to_owned(),
    }
}

/// List a local directory, sorted by name, directories suffixed with `/`.
///
/// Entry URLs are built by appending names to `base_url`. Under a `file:`
/// URL each name is percent-encoded as a path segment, so the URL maps back
/// to the same file.
///
/// # Errors
///
/// Returns [`FetchError::Download`] if the directory cannot be read and
/// [`FetchError::InvalidUrl`] if a `file:` base URL cannot be parsed.
pub fn list_local(dir: &Path, base_url: &str) -> Result<Vec<DirEntry>, FetchError> {
    let read_err = |e: std::io::Error| FetchError::Download {
        url: base_url.to_owned(),
        reason: e.to_string(),
    };
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().map_err(read_err)?.is_dir() {
            name.push('/');
        }
        entries.push(DirEntry {
            url: entry_url(base_url, &name)?,
            name,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn entry_url(base_url: &str, name: &str) -> Result<String, FetchError> {
    if !base_url.starts_with("file:") {
        return Ok(format!("{}/{name}", base_url.trim_end_matches('/')));
    }
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: base_url.to_owned(),
        reason,
    };
    let mut url =
        url::Url::parse(&normalize_file_url(base_url)).map_err(|e| invalid(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| invalid("cannot hold path segments".to_owned()))?;
        segments.pop_if_empty();
        match name.strip_suffix('/') {
            Some(dir) => {
                segments.push(dir).push("");
            }
            None => {
                segments.push(name);
            }
        }
    }
    Ok(url.into())
}

/// Parse an HTTP directory index page.
///
/// Every anchor is resolved against `base_url`. Everything up to and including
/// the parent directory entry (`Parent Directory` or `..`) is dropped; when
/// there is no such entry all anchors are returned.
///
/// # Errors
///
/// Returns [`FetchError::InvalidUrl`] if `base_url` or a link cannot be
/// resolved.
pub fn parse_index(html: &str, base_url: &str) -> Result<Vec<DirEntry>, FetchError> {
    let base = url::Url::parse(base_url).map_err(|e| FetchError::InvalidUrl {
        url: base_url.to_owned(),
        reason: e.to_string(),
    })?;
    let mut links = Vec::new();
    for caps in HREF_RE.captures_iter(html) {
        let (_, [href, text]) = caps.extract();
        let url = base.join(href).map_err(|e| FetchError::InvalidUrl {
            url: href.to_owned(),
            reason: e.to_string(),
        })?;
        links.push(DirEntry {
            name: text.to_owned(),
            url: url.to_string(),
        });
    }
    match links
        .iter()
        .position(|e| e.name == "Parent Directory" || e.name == "..")
    {
        Some(parent) => Ok(links.split_off(parent + 1)),
        None => Ok(links),
    }
}

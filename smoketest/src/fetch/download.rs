//! Streamed, atomic downloads into the local cache.
//!
//! Bytes are written to a temporary file in the destination directory and
//! renamed into place only once the whole stream has been read, so no later
//! stage can observe a partially written artifact.

use super::{FetchError, ReleaseSource, retry_once};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Size of each streamed read.
pub const DOWNLOAD_CHUNK: usize = 65536;

/// Whether files already present in the cache may be reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Always fetch again, replacing cached files.
    #[default]
    ForceClean,
    /// Keep files that are already cached.
    Reuse,
}

/// Downloads resources from a [`ReleaseSource`] into local directories.
pub struct Fetcher<'a> {
    source: &'a dyn ReleaseSource,
    policy: CachePolicy,
}

impl<'a> Fetcher<'a> {
    /// Create a fetcher over `source` with the given cache policy.
    pub fn new(source: &'a dyn ReleaseSource, policy: CachePolicy) -> Self {
        Self { source, policy }
    }

    /// The underlying source.
    #[must_use]
    pub fn source(&self) -> &'a dyn ReleaseSource {
        self.source
    }

    /// The cache policy.
    #[must_use]
    pub const fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Download `url` to `dir/name`, retrying once on failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the second attempt if both attempts fail:
    /// [`FetchError::NotFound`] if the resource does not exist, and
    /// [`FetchError::Download`] or [`FetchError::Io`] otherwise.
    pub fn fetch(&self, name: &str, url: &str, dir: &Path) -> Result<PathBuf, FetchError> {
        let dest = dir.join(name);
        if self.policy == CachePolicy::Reuse && dest.is_file() {
            log::trace!("reusing cached {}", dest.display());
            return Ok(dest);
        }
        retry_once(url, || self.attempt(url, dir, &dest))?;
        Ok(dest)
    }

    fn attempt(&self, url: &str, dir: &Path, dest: &Path) -> Result<(), FetchError> {
        let mut reader = self.source.open(url)?;
        // Dropping the temporary file on any error removes the partial download.
        let mut partial = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
        let copied = copy_chunked(&mut reader, partial.as_file_mut()).map_err(|e| {
            FetchError::Download {
                url: url.to_owned(),
                reason: e.to_string(),
            }
        })?;
        partial.as_file_mut().flush().map_err(|e| io_error(dest, e))?;
        partial
            .persist(dest)
            .map_err(|e| io_error(dest, e.error))?;
        log::trace!("downloaded {url} ({copied} bytes) to {}", dest.display());
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_owned(),
        source,
    }
}

/// Copy `reader` into `writer` in [`DOWNLOAD_CHUNK`]-sized reads.
fn copy_chunked(reader: &mut dyn Read, writer: &mut dyn Write) -> std::io::Result<u64> {
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;

//! Recursive mirroring of a remote directory tree into the cache.

use super::{FetchError, Fetcher};
use std::path::{Path, PathBuf};

/// Mirror the directory at `url` into `target_dir`.
///
/// Subdirectories are descended into and leaf files downloaded; entries whose
/// name appears in `exclusions` are skipped along with everything beneath
/// them. Returns every materialized file, in listing order.
///
/// # Errors
///
/// Returns the first listing or download error encountered.
pub fn crawl(
    fetcher: &Fetcher<'_>,
    url: &str,
    target_dir: &Path,
    exclusions: &[String],
) -> Result<Vec<PathBuf>, FetchError> {
    let mut files = Vec::new();
    let mut pending = vec![(url.to_owned(), target_dir.to_owned())];
    while let Some((dir_url, dir)) = pending.pop() {
        std::fs::create_dir_all(&dir).map_err(|source| FetchError::Io {
            path: dir.clone(),
            source,
        })?;
        let entries = fetcher.source().list(&dir_url)?;
        let mut subdirs = Vec::new();
        for entry in entries {
            if exclusions.iter().any(|ex| *ex == entry.name) {
                log::trace!("crawl skips excluded {}", entry.url);
                continue;
            }
            if entry.is_dir() {
                let name = entry.name.trim_end_matches('/');
                subdirs.push((entry.url, dir.join(name)));
            } else {
                files.push(fetcher.fetch(&entry.name, &entry.url, &dir)?);
            }
        }
        // Reverse so directories are visited in listing order.
        pending.extend(subdirs.into_iter().rev());
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{CachePolicy, HttpSource};
    use rstest::rstest;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(path, contents).expect("write");
    }

    #[rstest]
    fn crawl_mirrors_nested_tree_with_exclusions() {
        let remote = tempfile::tempdir().expect("remote");
        let base = remote.path();
        write(&base.join("pom.xml.template"), "root");
        write(&base.join("lucene/core/pom.xml.template"), "core");
        write(&base.join("lucene/maven.testlogging.properties"), "x");
        write(&base.join("solr/pom.xml.template"), "solr");

        let local = tempfile::tempdir().expect("local");
        let fetcher = Fetcher::new(&HttpSource, CachePolicy::ForceClean);
        let url = format!("file://{}/", base.display());
        let files = crawl(
            &fetcher,
            &url,
            local.path(),
            &["maven.testlogging.properties".to_owned()],
        )
        .expect("crawl");

        let mut relative: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(local.path()).expect("inside target").to_owned())
            .collect();
        relative.sort();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("lucene/core/pom.xml.template"),
                PathBuf::from("pom.xml.template"),
                PathBuf::from("solr/pom.xml.template"),
            ]
        );
        assert_eq!(
            std::fs::read_to_string(local.path().join("lucene/core/pom.xml.template"))
                .expect("read"),
            "core"
        );
    }
}

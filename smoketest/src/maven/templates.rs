//! Discovery of the POM templates a release was built from.
//!
//! Templates come from the release branch when the configured branches
//! listing has one for this `major.minor`, and from a local working copy
//! otherwise.

use super::coordinate::CoordinateError;
use crate::config::{MavenConfig, expand};
use crate::error::{Result, SmokeError};
use crate::fetch::{Fetcher, crawl};
use crate::output::VerificationLog;
use crate::release::ReleaseVersion;
use std::path::{Path, PathBuf};

/// POM templates below a templates root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PomTemplates {
    root: PathBuf,
    location: String,
    file_name: String,
    files: Vec<PathBuf>,
}

impl PomTemplates {
    /// Fetch the release branch templates, or fall back to the local
    /// checkout.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::Precondition`] when neither source exists and
    /// download errors from the crawl.
    pub fn locate(
        fetcher: &Fetcher<'_>,
        maven: &MavenConfig,
        version: &ReleaseVersion,
        tmp_dir: &Path,
        log: &mut VerificationLog<'_>,
    ) -> Result<Self> {
        log.step(2, "get POM templates");
        if let Some(branch_url) = release_branch_url(fetcher, maven, version, log) {
            let url = format!("{branch_url}{}", maven.templates_path);
            let target = tmp_dir.join(maven.templates_path.trim_end_matches('/'));
            let files = crawl(fetcher, &url, &target, &maven.crawl_exclusions)?;
            log::debug!("crawled {} files from {url}", files.len());
            return Ok(Self::from_files(target, url, &maven.template_file_name, files));
        }
        let Some(checkout) = &maven.local_checkout else {
            return Err(SmokeError::precondition(format!(
                "no release branch {} found and no local checkout configured for POM templates",
                release_branch_name(maven, version)
            )));
        };
        let root = checkout.join(&maven.templates_path);
        log.step(3, format!("using POM templates from {}", root.display()));
        Ok(Self::scan(&root, &maven.template_file_name)?)
    }

    /// Collect every template below a local directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tree cannot be walked.
    pub fn scan(root: &Path, file_name: &str) -> std::io::Result<Self> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_owned()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    pending.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
        }
        Ok(Self::from_files(
            root.to_owned(),
            root.display().to_string(),
            file_name,
            files,
        ))
    }

    fn from_files(root: PathBuf, location: String, file_name: &str, files: Vec<PathBuf>) -> Self {
        let mut files: Vec<_> = files
            .into_iter()
            .filter(|f| f.file_name().is_some_and(|n| n == file_name))
            .collect();
        files.sort();
        Self {
            root,
            location,
            file_name: file_name.to_owned(),
            files,
        }
    }

    /// Templates of `project`: those whose path below the root starts with
    /// the project name.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::NoTemplates`] if there are none.
    pub fn for_project(&self, project: &str) -> std::result::Result<Vec<&Path>, CoordinateError> {
        let templates: Vec<_> = self
            .files
            .iter()
            .filter(|file| {
                file.strip_prefix(&self.root)
                    .ok()
                    .and_then(|relative| relative.to_str())
                    .is_some_and(|relative| relative.starts_with(project) && relative.contains('/'))
            })
            .map(PathBuf::as_path)
            .collect();
        if templates.is_empty() {
            return Err(self.none_found(project));
        }
        Ok(templates)
    }

    /// The template at the root, parent of every project POM.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::NoTemplates`] if it is absent.
    pub fn grandfather(&self) -> std::result::Result<&Path, CoordinateError> {
        let expected = self.root.join(&self.file_name);
        self.files
            .iter()
            .find(|file| **file == expected)
            .map(PathBuf::as_path)
            .ok_or_else(|| self.none_found("grandfather"))
    }

    /// Where the templates were read from.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    fn none_found(&self, kind: &str) -> CoordinateError {
        CoordinateError::NoTemplates {
            kind: kind.to_owned(),
            location: self.location.clone(),
        }
    }
}

fn release_branch_name(maven: &MavenConfig, version: &ReleaseVersion) -> String {
    let (major, minor) = (version.major().to_string(), version.minor().to_string());
    expand(&maven.release_branch, &[("major", &major), ("minor", &minor)])
}

fn release_branch_url(
    fetcher: &Fetcher<'_>,
    maven: &MavenConfig,
    version: &ReleaseVersion,
    log: &mut VerificationLog<'_>,
) -> Option<String> {
    let branches_url = maven.branches_url.as_deref()?;
    let wanted = release_branch_name(maven, version);
    match fetcher.source().list(branches_url) {
        Ok(entries) => entries.into_iter().find(|e| e.name == wanted).map(|e| e.url),
        Err(e) => {
            log.warn(format!("cannot list release branches at {branches_url}: {e}"));
            None
        }
    }
}

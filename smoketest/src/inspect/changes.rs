//! Changes document checks.
//!
//! The published `Changes.html` and every `CHANGES.txt` in an unpacked tree
//! must describe the release being tested: no "not yet released" markers, no
//! issue ids written with an underscore, and (for HTML) no section repeated
//! under one release heading.

use crate::config::{ChangesRules, expand};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// File name of the published HTML changes document.
pub const CHANGES_HTML: &str = "Changes.html";

/// File name of a plain-text changes document.
pub const CHANGES_TXT: &str = "CHANGES.txt";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a id="(.*?)".*?>(.*?)</a>"#).expect("section anchor regex is valid")
});

/// Errors raised by changes document checks.
#[derive(Debug, Error)]
pub enum ChangesError {
    /// The changes directory has no HTML document.
    #[error("did not see Changes.html link from {url}")]
    MissingDocument {
        /// The changes directory listing.
        url: String,
    },

    /// The HTML document does not mention the release.
    #[error("did not see \"Release {version}\" in {document}")]
    MissingRelease {
        /// Document name or URL.
        document: String,
        /// Release version.
        version: String,
    },

    /// An issue id uses `_` instead of `-`.
    #[error("incorrect issue (_ instead of -) in {document}: {issue}")]
    UnderscoreIssue {
        /// Document name or URL.
        document: String,
        /// The offending id.
        issue: String,
    },

    /// The document still calls the release unreleased.
    #[error("saw \"not yet released\" in {document}")]
    NotYetReleased {
        /// Document name or URL.
        document: String,
    },

    /// A text document lacks the project's release heading.
    #[error("did not see \"{heading}\" in {document}")]
    MissingHeading {
        /// Document path.
        document: String,
        /// The expected heading text.
        heading: String,
    },

    /// A section id or title appears twice under one release.
    #[error("{document} has duplicate section \"{section}\" under release \"{release}\"")]
    DuplicateSection {
        /// Document name or URL.
        document: String,
        /// The repeated section title.
        section: String,
        /// Release heading it was repeated under.
        release: String,
    },

    /// The issue id pattern could not be built from the project names.
    #[error("invalid issue id pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A document could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The document path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Checks changes documents of one release.
#[derive(Debug)]
pub struct ChangesChecker {
    version: String,
    underscore_html: Regex,
    underscore_text: Regex,
}

impl ChangesChecker {
    /// Build a checker whose issue id rules cover `projects`.
    ///
    /// # Errors
    ///
    /// Returns [`ChangesError::Pattern`] if the issue id pattern is invalid.
    pub fn new<'a>(projects: impl IntoIterator<Item = &'a str>, version: &str) -> Result<Self, ChangesError> {
        let keys = projects
            .into_iter()
            .map(|name| regex::escape(&name.to_uppercase()))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            version: version.to_owned(),
            underscore_html: Regex::new(&format!(r"<li>(\s*(?:{keys})_\d{{4,}})"))?,
            underscore_text: Regex::new(&format!(r"\s+((?:{keys})_\d{{4,}})"))?,
        })
    }

    /// Check the published HTML changes document.
    ///
    /// # Errors
    ///
    /// Returns the first [`ChangesError`] found.
    pub fn check_html(&self, document: &str, text: &str) -> Result<(), ChangesError> {
        if !text.contains(&format!("Release {}", self.version)) {
            return Err(ChangesError::MissingRelease {
                document: document.to_owned(),
                version: self.version.clone(),
            });
        }
        check_common(document, text, &self.underscore_html)?;

        let mut seen_ids = HashSet::new();
        let mut seen_titles = HashSet::new();
        let mut release = String::new();
        for captures in SECTION_RE.captures_iter(text) {
            let id = captures.get(1).map_or("", |m| m.as_str());
            let title = captures.get(2).map_or("", |m| m.as_str());
            if let Some(heading) = title
                .get(..8)
                .filter(|prefix| prefix.eq_ignore_ascii_case("release "))
                .and_then(|_| title.get(8..))
            {
                release = heading.trim().to_owned();
                seen_titles.clear();
            }
            if !seen_ids.insert(id) || !seen_titles.insert(title) {
                return Err(ChangesError::DuplicateSection {
                    document: document.to_owned(),
                    section: title.to_owned(),
                    release,
                });
            }
        }
        Ok(())
    }

    /// Check one plain-text changes document.
    ///
    /// # Errors
    ///
    /// Returns the first [`ChangesError`] found.
    pub fn check_text(&self, document: &str, text: &str, rules: &ChangesRules) -> Result<(), ChangesError> {
        check_common(document, text, &self.underscore_text)?;
        let heading = expand(&rules.heading, &[("version", self.version.as_str())]);
        let exempt = rules.exempt_paths.iter().any(|fragment| document.contains(fragment));
        if !text.contains(&heading) && !exempt {
            return Err(ChangesError::MissingHeading {
                document: document.to_owned(),
                heading,
            });
        }
        Ok(())
    }

    /// Check every `CHANGES.txt` below `root` and return how many were
    /// checked.
    ///
    /// # Errors
    ///
    /// Returns the first [`ChangesError`] found.
    pub fn check_tree(&self, root: &Path, rules: &ChangesRules) -> Result<usize, ChangesError> {
        let mut checked = 0;
        let mut pending = vec![root.to_owned()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir).map_err(|e| io_error(&dir, e))? {
                let entry = entry.map_err(|e| io_error(&dir, e))?;
                let path = entry.path();
                if entry.file_type().map_err(|e| io_error(&path, e))?.is_dir() {
                    pending.push(path);
                } else if entry.file_name() == CHANGES_TXT {
                    let text = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
                    let document = path.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
                    self.check_text(&document, &text, rules)?;
                    checked += 1;
                }
            }
        }
        Ok(checked)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ChangesError {
    ChangesError::Io {
        path: path.to_owned(),
        source,
    }
}

fn check_common(document: &str, text: &str, underscore: &Regex) -> Result<(), ChangesError> {
    if let Some(issue) = underscore.captures(text).and_then(|c| c.get(1)) {
        return Err(ChangesError::UnderscoreIssue {
            document: document.to_owned(),
            issue: issue.as_str().to_owned(),
        });
    }
    if text.to_lowercase().contains("not yet released") {
        return Err(ChangesError::NotYetReleased {
            document: document.to_owned(),
        });
    }
    Ok(())
}

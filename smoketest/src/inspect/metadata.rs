//! Embedded metadata of packaged binaries.
//!
//! Packages (jar and war files) are zip containers. They are opened for
//! random access without being extracted: a package on disk is read from its
//! file, and a package nested inside another one is read out into memory and
//! opened from there. Both go through [`PackageSource`], so the namespace scan
//! and the metadata check have a single code path.

use super::canonical::CanonicalTexts;
use crate::config::{PackageRules, expand};
use crate::release::RevisionCheck;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while inspecting package metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The package is not a readable zip container.
    #[error("{package} cannot be opened: {reason}")]
    Open {
        /// Package description.
        package: String,
        /// Reader error.
        reason: String,
    },

    /// A required metadata entry is absent.
    #[error("{package} is missing {entry}")]
    MissingEntry {
        /// Package description.
        package: String,
        /// The missing entry.
        entry: String,
    },

    /// The manifest lacks a required line.
    #[error("{package} is missing \"{line}\" inside its {manifest}")]
    MissingManifestLine {
        /// Package description.
        package: String,
        /// The missing line.
        line: String,
        /// Manifest entry name.
        manifest: String,
    },

    /// The manifest does not carry the expected build revision.
    #[error("{package} is missing \"{line}\" inside its {manifest} (wrong revision?)")]
    WrongRevision {
        /// Package description.
        package: String,
        /// The expected revision line.
        line: String,
        /// Manifest entry name.
        manifest: String,
    },

    /// An embedded notice or license differs from the project's canonical
    /// text.
    #[error("{package}: {entry} contents doesn't match the {project} {canonical}")]
    ContentMismatch {
        /// Package description.
        package: String,
        /// The embedded entry.
        entry: String,
        /// Project whose canonical text was compared.
        project: String,
        /// Canonical file name.
        canonical: String,
    },

    /// No canonical text is known for the package's owning project.
    #[error("{package}: no canonical notice/license loaded for {owner}")]
    NoCanonicalText {
        /// Package description.
        package: String,
        /// Owning project, or a description of why none matched.
        owner: String,
    },

    /// The package contains classes under a reserved namespace.
    #[error("{package} contains forbidden class \"{class}\"")]
    ForbiddenClass {
        /// Package description.
        package: String,
        /// The offending entry name.
        class: String,
    },

    /// The package could not be read.
    #[error("failed to read {package}: {source}")]
    Io {
        /// Package description.
        package: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Anything a zip reader can be built over.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Reader over a package's bytes.
pub type PackageArchive<'a> = zip::ZipArchive<Box<dyn ReadSeek + 'a>>;

/// A package to inspect, on disk or held in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageSource {
    /// A package file.
    File(PathBuf),
    /// A package read out of an enclosing package.
    Nested {
        /// Description of the enclosing package.
        outer: String,
        /// Entry name inside the enclosing package.
        name: String,
        /// Entry contents.
        bytes: Vec<u8>,
    },
}

impl PackageSource {
    /// Description used in messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Nested { outer, name, .. } => format!("{name} inside {outer}"),
        }
    }

    /// Base file name of the package.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Nested { name, .. } => name.rsplit('/').next().unwrap_or(name).to_owned(),
        }
    }

    /// The full package contents.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Io`] if a package file cannot be read.
    pub fn bytes(&self) -> Result<Cow<'_, [u8]>, MetadataError> {
        match self {
            Self::File(path) => std::fs::read(path).map(Cow::Owned).map_err(|e| self.io(e)),
            Self::Nested { bytes, .. } => Ok(Cow::Borrowed(bytes)),
        }
    }

    /// Open the package for random access.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Open`] if the package is not a zip container.
    pub fn open(&self) -> Result<PackageArchive<'_>, MetadataError> {
        let reader: Box<dyn ReadSeek + '_> = match self {
            Self::File(path) => Box::new(BufReader::new(File::open(path).map_err(|e| self.io(e))?)),
            Self::Nested { bytes, .. } => Box::new(Cursor::new(bytes.as_slice())),
        };
        zip::ZipArchive::new(reader).map_err(|e| MetadataError::Open {
            package: self.describe(),
            reason: e.to_string(),
        })
    }

    /// Every package nested directly inside this one.
    ///
    /// # Errors
    ///
    /// Returns an error if this package or a nested entry cannot be read.
    pub fn nested_packages(&self, rules: &PackageRules) -> Result<Vec<Self>, MetadataError> {
        let mut archive = self.open()?;
        let names: Vec<String> = archive
            .file_names()
            .filter(|name| rules.is_package(name))
            .map(str::to_owned)
            .collect();
        let mut nested = Vec::with_capacity(names.len());
        for name in names {
            let bytes = read_entry(&mut archive, &name, self)?;
            nested.push(Self::Nested {
                outer: self.describe(),
                name,
                bytes,
            });
        }
        Ok(nested)
    }

    fn io(&self, source: std::io::Error) -> MetadataError {
        MetadataError::Io {
            package: self.describe(),
            source,
        }
    }
}

fn read_entry(
    archive: &mut PackageArchive<'_>,
    name: &str,
    package: &PackageSource,
) -> Result<Vec<u8>, MetadataError> {
    let mut entry = archive.by_name(name).map_err(|_| MetadataError::MissingEntry {
        package: package.describe(),
        entry: name.to_owned(),
    })?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).map_err(|e| package.io(e))?;
    Ok(bytes)
}

/// Fail if `package`, or any package nested inside it at any depth, contains
/// a class under a forbidden namespace prefix.
///
/// # Errors
///
/// Returns [`MetadataError::ForbiddenClass`] for the first offending class.
pub fn scan_namespaces(package: PackageSource, rules: &PackageRules) -> Result<(), MetadataError> {
    let mut pending = vec![package];
    while let Some(current) = pending.pop() {
        let archive = current.open()?;
        let forbidden = archive.file_names().find(|name| {
            name.ends_with(".class")
                && rules
                    .forbidden_class_prefixes
                    .iter()
                    .any(|prefix| name.starts_with(prefix.as_str()))
        });
        if let Some(class) = forbidden {
            return Err(MetadataError::ForbiddenClass {
                package: current.describe(),
                class: class.to_owned(),
            });
        }
        drop(archive);
        pending.extend(current.nested_packages(rules)?);
    }
    Ok(())
}

/// Check a package's manifest, notice and license.
///
/// The manifest must contain every required line (with `{version}`
/// expanded) and, unless the revision check is skipped, the revision line.
/// The embedded notice and license must equal the canonical texts of the
/// project owning the package.
///
/// # Errors
///
/// Returns the [`MetadataError`] describing the first violation.
pub fn check_metadata(
    package: &PackageSource,
    rules: &PackageRules,
    version: &str,
    revision: &RevisionCheck,
    canonical: &CanonicalTexts,
) -> Result<(), MetadataError> {
    let mut archive = package.open()?;
    for entry in [&rules.manifest_entry, &rules.notice_entry, &rules.license_entry] {
        if archive.index_for_name(entry).is_none() {
            return Err(MetadataError::MissingEntry {
                package: package.describe(),
                entry: entry.clone(),
            });
        }
    }

    let manifest = String::from_utf8_lossy(&read_entry(&mut archive, &rules.manifest_entry, package)?)
        .into_owned();
    let vars = [("version", version), ("revision", revision.label())];
    for required in &rules.required_manifest_lines {
        let line = expand(required, &vars);
        if !manifest.contains(&line) {
            return Err(MetadataError::MissingManifestLine {
                package: package.describe(),
                line,
                manifest: rules.manifest_entry.clone(),
            });
        }
    }
    if let RevisionCheck::Stamp(_) = revision {
        let line = expand(&rules.revision_line, &vars);
        if !manifest.contains(&line) {
            return Err(MetadataError::WrongRevision {
                package: package.describe(),
                line,
                manifest: rules.manifest_entry.clone(),
            });
        }
    }

    let file_name = package.file_name();
    let owner = canonical
        .owner_of(&file_name)
        .ok_or_else(|| MetadataError::NoCanonicalText {
            package: package.describe(),
            owner: format!("no configured project named in {file_name}"),
        })?;
    let texts = canonical.get(owner).ok_or_else(|| MetadataError::NoCanonicalText {
        package: package.describe(),
        owner: owner.to_owned(),
    })?;
    let embedded = [
        (&rules.notice_entry, texts.notice.as_bytes(), "NOTICE.txt"),
        (&rules.license_entry, texts.license.as_bytes(), "LICENSE.txt"),
    ];
    for (entry, expected, canonical_name) in embedded {
        if read_entry(&mut archive, entry, package)? != expected {
            return Err(MetadataError::ContentMismatch {
                package: package.describe(),
                entry: entry.clone(),
                project: owner.to_owned(),
                canonical: canonical_name.to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;

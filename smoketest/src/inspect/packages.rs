//! Package checks over an unpacked tree.
//!
//! Every packaged binary found in a distribution is scanned for classes under
//! reserved namespaces, packages named after a configured project get the
//! metadata check, and packages re-published from a dependency project must be
//! byte-identical to the dependency's own binary distribution.

use super::canonical::CanonicalTexts;
use super::metadata::{PackageSource, check_metadata, scan_namespaces};
use crate::config::{PackageRules, ProjectConfig};
use crate::error::{Result, SmokeError};
use crate::output::VerificationLog;
use crate::release::RevisionCheck;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Files of a binary distribution, by base name.
#[derive(Clone, Debug, Default)]
pub struct DistributionIndex {
    by_name: BTreeMap<String, PathBuf>,
}

impl DistributionIndex {
    /// Index every file below `root`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the tree cannot be walked.
    pub fn build(root: &Path) -> std::io::Result<Self> {
        let mut by_name = BTreeMap::new();
        let mut pending = vec![root.to_owned()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    pending.push(entry.path());
                } else {
                    by_name.insert(entry.file_name().to_string_lossy().into_owned(), entry.path());
                }
            }
        }
        Ok(Self { by_name })
    }

    /// The distributed file named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.by_name.get(name).map(PathBuf::as_path)
    }

    /// Number of indexed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// A dependency project's binary distribution.
#[derive(Clone, Copy, Debug)]
pub struct Dependency<'a> {
    /// Dependency project name.
    pub project: &'a str,
    /// Its binary distribution.
    pub index: &'a DistributionIndex,
}

/// Package checks for one project.
#[derive(Clone, Copy, Debug)]
pub struct PackageCheck<'a> {
    /// Project whose tree is checked.
    pub project: &'a ProjectConfig,
    /// Package rules.
    pub rules: &'a PackageRules,
    /// Release version.
    pub version: &'a str,
    /// Revision stamp check.
    pub revision: &'a RevisionCheck,
    /// Canonical notice/license texts.
    pub canonical: &'a CanonicalTexts,
    /// Binary distribution of the project this one depends on.
    pub dependency: Option<Dependency<'a>>,
}

impl PackageCheck<'_> {
    /// Check every package below `root`.
    ///
    /// Packages inside an exempt location are skipped entirely, and
    /// configured wars are left to [`PackageCheck::check_war`].
    ///
    /// # Errors
    ///
    /// Returns the first metadata, namespace or identity failure.
    pub fn check_tree(&self, root: &Path, log: &mut VerificationLog<'_>) -> Result<()> {
        log.step(2, "verify package metadata/identity/no forbidden namespace classes...");
        let mut checked = 0_usize;
        let mut pending = vec![root.to_owned()];
        while let Some(dir) = pending.pop() {
            let dir_name = dir.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
            let mut files = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    pending.push(entry.path());
                } else {
                    files.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            files.sort();
            for file in files.iter().filter(|name| self.rules.is_package(name)) {
                let path = dir.join(file);
                if self.is_configured_war(root, &path) {
                    continue;
                }
                if self
                    .project
                    .namespace_exemptions
                    .iter()
                    .any(|exemption| exemption.matches(&dir_name, file))
                {
                    log.step(3, format!("skipping check of {dir_name}/{file}: exempt location"));
                    continue;
                }
                self.check_package(&PackageSource::File(path))?;
                checked += 1;
            }
        }
        log::debug!("checked {checked} packages below {}", root.display());
        Ok(())
    }

    /// Check a war file and every package nested inside it.
    ///
    /// # Errors
    ///
    /// Returns the first metadata, namespace or identity failure.
    pub fn check_war(&self, war: &Path, log: &mut VerificationLog<'_>) -> Result<()> {
        log.step(2, format!("verify {} metadata/contained package identity...", war.display()));
        let outer = PackageSource::File(war.to_owned());
        scan_namespaces(outer.clone(), self.rules)?;
        check_metadata(&outer, self.rules, self.version, self.revision, self.canonical)?;
        for nested in outer.nested_packages(self.rules)? {
            if self.canonical.owner_of(&nested.file_name()).is_some() {
                check_metadata(&nested, self.rules, self.version, self.revision, self.canonical)?;
            }
            self.check_dependency_copy(&nested)?;
        }
        Ok(())
    }

    fn is_configured_war(&self, root: &Path, path: &Path) -> bool {
        path.strip_prefix(root)
            .is_ok_and(|relative| self.project.wars.iter().any(|war| relative == Path::new(war)))
    }

    fn check_package(&self, package: &PackageSource) -> Result<()> {
        scan_namespaces(package.clone(), self.rules)?;
        if self.canonical.owner_of(&package.file_name()).is_some() {
            check_metadata(package, self.rules, self.version, self.revision, self.canonical)?;
        }
        self.check_dependency_copy(package)
    }

    fn check_dependency_copy(&self, package: &PackageSource) -> Result<()> {
        let Some(dependency) = self.dependency else {
            return Ok(());
        };
        let name = package.file_name();
        if !name.to_lowercase().contains(dependency.project) {
            return Ok(());
        }
        let Some(distributed) = dependency.index.get(&name) else {
            return Err(SmokeError::MissingFromDistribution {
                artifact: package.describe(),
                project: dependency.project.to_owned(),
            });
        };
        if package.bytes()?.as_ref() != std::fs::read(distributed)?.as_slice() {
            return Err(SmokeError::ByteIdenticalMismatch {
                artifact: match package {
                    PackageSource::File(path) => path.clone(),
                    PackageSource::Nested { .. } => PathBuf::from(package.describe()),
                },
                distributed: distributed.to_owned(),
                project: dependency.project.to_owned(),
            });
        }
        Ok(())
    }
}

/// Whether two files have identical contents.
///
/// # Errors
///
/// Returns an I/O error if either file cannot be read.
pub fn files_identical(a: &Path, b: &Path) -> std::io::Result<bool> {
    let (meta_a, meta_b) = (std::fs::metadata(a)?, std::fs::metadata(b)?);
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    Ok(std::fs::read(a)? == std::fs::read(b)?)
}

#[cfg(test)]
#[path = "packages_tests.rs"]
mod tests;

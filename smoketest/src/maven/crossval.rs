//! Cross-validation of the staged Maven repository.
//!
//! Each project's repository tree is mirrored into the scratch directory and
//! correlated against the POM templates, its own POMs, its digest and
//! signature companions, and the project's binary distribution.

use super::coordinate::{Coordinate, CoordinateError, deploy_skipped, read_pom};
use super::templates::PomTemplates;
use crate::config::{SmokeConfig, expand};
use crate::error::{Result, SmokeError};
use crate::fetch::{Fetcher, crawl};
use crate::inspect::{CanonicalTexts, Dependency, DistributionIndex, PackageCheck, files_identical};
use crate::output::VerificationLog;
use crate::release::ReleaseContext;
use crate::verify::digest::{DigestError, parse_bare_digest};
use crate::verify::{DigestAlgorithm, ExpectedDigest, KeyRing, SignatureVerifier, verify_digests};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Extensions of files deployed with digests and signatures.
const REPOSITORY_EXTENSIONS: [&str; 3] = ["jar", "war", "pom"];

/// Files of one project's mirrored Maven repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MavenArtifacts {
    /// Owning project.
    pub project: String,
    /// Every mirrored file.
    pub files: BTreeSet<PathBuf>,
}

impl MavenArtifacts {
    /// Collect already mirrored files.
    pub fn new(project: &str, files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            project: project.to_owned(),
            files: files.into_iter().collect(),
        }
    }

    /// Mirror `url` into `target_dir`.
    ///
    /// # Errors
    ///
    /// Returns the first listing or download failure.
    pub fn download(fetcher: &Fetcher<'_>, project: &str, url: &str, target_dir: &Path) -> Result<Self> {
        let files = crawl(fetcher, url, target_dir, &[])?;
        log::debug!("mirrored {} Maven files for {project}", files.len());
        Ok(Self::new(project, files))
    }

    /// Whether `path` was mirrored.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    fn release_binaries<'a>(&'a self, version: &'a str) -> impl Iterator<Item = &'a Path> + 'a {
        self.files.iter().map(PathBuf::as_path).filter(move |path| {
            let name = file_name(path);
            name.strip_suffix(".jar")
                .or_else(|| name.strip_suffix(".war"))
                .is_some_and(|stem| stem.ends_with(version))
        })
    }

    fn with_extension<'a>(&'a self, extension: &'a str) -> impl Iterator<Item = &'a Path> + 'a {
        self.files
            .iter()
            .map(PathBuf::as_path)
            .filter(move |path| path.extension().is_some_and(|ext| ext == extension))
    }

    fn repository_files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path).filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| REPOSITORY_EXTENSIONS.contains(&ext))
        })
    }

    fn require(&self, artifact: &Path, companion: PathBuf) -> std::result::Result<(), CoordinateError> {
        if self.contains(&companion) {
            Ok(())
        } else {
            Err(CoordinateError::MissingCompanion {
                artifact: artifact.to_owned(),
                companion,
            })
        }
    }
}

/// Require a POM next to every release `.jar` and `.war`.
///
/// # Errors
///
/// Returns [`CoordinateError::MissingPom`] for the first binary without one.
pub fn check_pom_per_binary(artifacts: &[MavenArtifacts], version: &str) -> std::result::Result<(), CoordinateError> {
    for project in artifacts {
        for binary in project.release_binaries(version) {
            let pom = binary.with_extension("pom");
            if !project.contains(&pom) {
                return Err(CoordinateError::MissingPom {
                    artifact: binary.to_owned(),
                });
            }
        }
    }
    Ok(())
}

/// Require a deployed artifact for every template that does not skip
/// deployment, searched across all projects below `maven_root`.
///
/// # Errors
///
/// Returns [`CoordinateError::MissingTemplateArtifact`] for the first template
/// without one, or a parse failure.
pub fn check_artifact_per_template(
    templates: &[&Path],
    artifacts: &[MavenArtifacts],
    maven_root: &Path,
    version: &str,
) -> std::result::Result<(), CoordinateError> {
    for template in templates {
        let xml = read_pom(template)?;
        if deploy_skipped(&xml, template)? {
            log::debug!("{} skips deployment", template.display());
            continue;
        }
        // The template's own version is never interpolated.
        let coordinate = Coordinate::parse(&xml, template)?;
        let artifact = maven_root.join(coordinate.repository_path(version, &coordinate.packaging));
        if !artifacts.iter().any(|project| project.contains(&artifact)) {
            return Err(CoordinateError::MissingTemplateArtifact {
                template: template.to_path_buf(),
                artifact,
            });
        }
    }
    Ok(())
}

/// Verify the bare digest files published next to every jar, war and POM.
///
/// # Errors
///
/// Returns [`DigestError::Missing`] for an absent digest file and
/// [`DigestError::Mismatch`] for one that disagrees.
pub fn check_digests(artifacts: &[MavenArtifacts], algorithms: &[DigestAlgorithm]) -> std::result::Result<(), DigestError> {
    for project in artifacts {
        for file in project.repository_files() {
            let mut expected = Vec::with_capacity(algorithms.len());
            for &algorithm in algorithms {
                let digest_file = companion(file, algorithm.suffix());
                if !project.contains(&digest_file) {
                    return Err(DigestError::Missing {
                        algorithm,
                        artifact: file.to_owned(),
                    });
                }
                let text = std::fs::read_to_string(&digest_file).map_err(|source| DigestError::Io {
                    path: digest_file.clone(),
                    source,
                })?;
                let hex = parse_bare_digest(&text, &digest_file.display().to_string())?;
                expected.push(ExpectedDigest { algorithm, hex });
            }
            verify_digests(file, &expected)?;
        }
    }
    Ok(())
}

/// Require `-javadoc.jar` and `-sources.jar` next to every release jar.
///
/// # Errors
///
/// Returns [`CoordinateError::MissingCompanion`] naming the absent jar.
pub fn check_javadoc_and_sources(
    artifacts: &[MavenArtifacts],
    version: &str,
) -> std::result::Result<(), CoordinateError> {
    for project in artifacts {
        for jar in project.with_extension("jar") {
            let Some(stem) = file_name(jar)
                .strip_suffix(".jar")
                .filter(|stem| stem.ends_with(version))
            else {
                continue;
            };
            for kind in ["javadoc", "sources"] {
                project.require(jar, jar.with_file_name(format!("{stem}-{kind}.jar")))?;
            }
        }
    }
    Ok(())
}

/// Check that every deployed POM's coordinate matches where it was found and
/// that its declared packaging was deployed beside it.
///
/// # Errors
///
/// Returns [`CoordinateError::PathMismatch`] or
/// [`CoordinateError::MissingArtifact`].
pub fn check_deployed_coordinates(
    artifacts: &[MavenArtifacts],
    version: &str,
) -> std::result::Result<(), CoordinateError> {
    for project in artifacts {
        for pom in project.with_extension("pom") {
            let coordinate = Coordinate::read(pom)?;
            if coordinate.version != version || !pom.ends_with(coordinate.repository_path(version, "pom")) {
                return Err(CoordinateError::PathMismatch {
                    coordinate: coordinate.to_string(),
                    pom: pom.to_owned(),
                });
            }
            let artifact = pom.with_extension(&coordinate.packaging);
            if !project.contains(&artifact) {
                return Err(CoordinateError::MissingArtifact {
                    packaging: coordinate.packaging,
                    pom: pom.to_owned(),
                });
            }
        }
    }
    Ok(())
}

/// Verify the detached signature of every jar, war and POM against the
/// project's key ring, reporting unexpected gpg warnings.
///
/// # Errors
///
/// Returns [`SmokeError::SignatureInvalid`] for a rejected signature and
/// [`SmokeError::CoordinateMismatch`] for a missing one.
pub fn check_signatures(
    verifier: &dyn SignatureVerifier,
    key_rings: &[KeyRing],
    artifacts: &[MavenArtifacts],
    signature_suffix: &str,
    log: &mut VerificationLog<'_>,
) -> Result<()> {
    for project in artifacts {
        let ring = key_rings
            .iter()
            .find(|ring| ring.project == project.project)
            .ok_or_else(|| SmokeError::precondition(format!("no key ring prepared for {}", project.project)))?;
        for file in project.repository_files() {
            let signature = companion(file, signature_suffix);
            project.require(file, signature.clone())?;
            for warning in verifier.verify(ring, file, &signature)? {
                log.warn(warning);
            }
        }
    }
    Ok(())
}

/// Require every release jar and war to be byte-identical to the file of the
/// same name in its project's binary distribution.
///
/// # Errors
///
/// Returns [`SmokeError::MissingFromDistribution`] or
/// [`SmokeError::ByteIdenticalMismatch`].
pub fn check_identical(
    artifacts: &[MavenArtifacts],
    distributions: &BTreeMap<String, DistributionIndex>,
    version: &str,
) -> Result<()> {
    for project in artifacts {
        let index = distributions.get(&project.project).ok_or_else(|| {
            SmokeError::precondition(format!("no binary distribution indexed for {}", project.project))
        })?;
        for artifact in project.release_binaries(version) {
            let Some(distributed) = index.get(file_name(artifact)) else {
                return Err(SmokeError::MissingFromDistribution {
                    artifact: artifact.display().to_string(),
                    project: project.project.clone(),
                });
            };
            if !files_identical(artifact, distributed)? {
                return Err(SmokeError::ByteIdenticalMismatch {
                    artifact: artifact.to_owned(),
                    distributed: distributed.to_owned(),
                    project: project.project.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Everything the Maven checks read from the rest of the run.
pub struct MavenCheck<'a> {
    /// Run configuration.
    pub config: &'a SmokeConfig,
    /// The release under test.
    pub context: &'a ReleaseContext,
    /// Downloads into the scratch directory.
    pub fetcher: &'a Fetcher<'a>,
    /// Signature verification.
    pub verifier: &'a dyn SignatureVerifier,
    /// Key rings prepared while checking the release directories.
    pub key_rings: &'a [KeyRing],
    /// Binary distributions, by project.
    pub distributions: &'a BTreeMap<String, DistributionIndex>,
    /// Canonical notice/license texts.
    pub canonical: &'a CanonicalTexts,
}

impl MavenCheck<'_> {
    /// Mirror every project's repository and run all Maven checks.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn run(&self, log: &mut VerificationLog<'_>) -> Result<()> {
        log.step(1, "Test Maven artifacts...");
        let maven = &self.config.maven;
        let version = self.context.version.as_str();
        let templates = PomTemplates::locate(
            self.fetcher,
            maven,
            &self.context.version,
            &self.context.tmp_dir,
            log,
        )?;
        templates.grandfather()?;

        log.step(2, "download artifacts");
        let maven_root = self.context.tmp_dir.join("maven");
        let mut artifacts = Vec::new();
        for project in self.config.project_names() {
            let group_path = expand(&maven.group_path, &[("project", project)]);
            let url = format!("{}maven/{group_path}/", self.context.project_url(project));
            artifacts.push(MavenArtifacts::download(
                self.fetcher,
                project,
                &url,
                &maven_root.join(&group_path),
            )?);
        }

        log.step(2, "verify that each binary artifact has a deployed POM...");
        check_pom_per_binary(&artifacts, version)?;
        log.step(2, "verify that there is an artifact for each POM template...");
        for project in self.config.project_names() {
            check_artifact_per_template(&templates.for_project(project)?, &artifacts, &maven_root, version)?;
        }
        log.step(2, "verify Maven artifacts' digests...");
        let algorithms: Vec<_> = self
            .config
            .digest_suffixes
            .iter()
            .filter_map(|suffix| DigestAlgorithm::from_suffix(suffix))
            .collect();
        check_digests(&artifacts, &algorithms)?;
        log.step(2, "check for javadoc and sources artifacts...");
        check_javadoc_and_sources(&artifacts, version)?;
        log.step(2, "verify deployed POMs' coordinates...");
        check_deployed_coordinates(&artifacts, version)?;
        if self.context.signed {
            log.step(2, "verify Maven artifact signatures...");
            check_signatures(
                self.verifier,
                self.key_rings,
                &artifacts,
                &self.config.signature_suffix,
                log,
            )?;
        }
        log.step(2, "verify that Maven artifacts are same as in the binary distribution...");
        check_identical(&artifacts, self.distributions, version)?;

        for project in &self.config.projects {
            let dependency = project.depends_on.as_deref().and_then(|name| {
                self.distributions
                    .get(name)
                    .map(|index| Dependency { project: name, index })
            });
            let check = PackageCheck {
                project,
                rules: &self.config.package,
                version,
                revision: &self.context.revision,
                canonical: self.canonical,
                dependency,
            };
            let group_path = expand(&maven.group_path, &[("project", project.name.as_str())]);
            check.check_tree(&maven_root.join(group_path), log)?;
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|name| name.to_str()).unwrap_or_default()
}

fn companion(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
#[path = "crossval_tests.rs"]
mod tests;

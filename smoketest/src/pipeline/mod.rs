//! The end-to-end verification run.
//!
//! Projects are verified strictly in configuration order, one artifact at a
//! time: download, digests, signature, unpack, layout, package checks, the
//! demo and service smoke tests, and the changes documents. The Maven
//! repositories are cross-validated last because they are compared against
//! the binary distributions unpacked before them. The first failure aborts
//! the run.

pub mod release_dir;
pub mod scratch;

pub use release_dir::ReleaseDirectory;
pub use scratch::{ScratchDir, first_free};

use crate::config::{ProjectConfig, SmokeConfig};
use crate::error::{Result, SmokeError};
use crate::fetch::{CachePolicy, Fetcher, ReleaseSource, read_text};
use crate::inspect::changes::CHANGES_HTML;
use crate::inspect::unpack::ArchiveFormat;
use crate::inspect::{
    CanonicalTexts, ChangesChecker, ChangesError, Dependency, DistributionIndex, PackageCheck,
    Toolchain, check_notice_embedding, unpack, verify_layout, verify_no_packages,
};
use crate::maven::MavenCheck;
use crate::output::VerificationLog;
use crate::release::{Artifact, PackageKind, ReleaseContext};
use crate::service::ServiceCheck;
use crate::verify::digest::parse_listed_digest;
use crate::verify::{
    CommandRunner, DigestAlgorithm, ExpectedDigest, KeyRing, SignatureVerifier, verify_digests,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The external boundaries a run talks through.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Where release resources are read from.
    pub source: &'a dyn ReleaseSource,
    /// Runs external commands.
    pub runner: &'a dyn CommandRunner,
    /// Verifies detached signatures.
    pub verifier: &'a dyn SignatureVerifier,
}

/// One smoke test run over a release candidate.
pub struct Pipeline<'a> {
    config: &'a SmokeConfig,
    context: ReleaseContext,
    fetcher: Fetcher<'a>,
    runner: &'a dyn CommandRunner,
    verifier: &'a dyn SignatureVerifier,
    changes: ChangesChecker,
    canonical: CanonicalTexts,
    key_rings: Vec<KeyRing>,
    distributions: BTreeMap<String, DistributionIndex>,
}

impl<'a> Pipeline<'a> {
    /// Prepare a run of `context` against `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::Changes`] if the project names cannot form the
    /// issue id rules.
    pub fn new(
        config: &'a SmokeConfig,
        context: ReleaseContext,
        collaborators: Collaborators<'a>,
        policy: CachePolicy,
    ) -> Result<Self> {
        let changes = ChangesChecker::new(config.project_names(), context.version.as_str())?;
        Ok(Self {
            config,
            context,
            fetcher: Fetcher::new(collaborators.source, policy),
            runner: collaborators.runner,
            verifier: collaborators.verifier,
            changes,
            canonical: CanonicalTexts::new(config.project_names()),
            key_rings: Vec::new(),
            distributions: BTreeMap::new(),
        })
    }

    /// Verify every project and then the Maven repositories.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn run(mut self, log: &mut VerificationLog<'_>) -> Result<()> {
        let scratch = ScratchDir::acquire(&self.context.tmp_dir, self.fetcher.policy())?;
        let project_urls = self.load_release(log)?;
        let config = self.config;
        for (project, url) in config.projects.iter().zip(project_urls) {
            self.check_project(project, &url, log)?;
        }

        let maven = MavenCheck {
            config: self.config,
            context: &self.context,
            fetcher: &self.fetcher,
            verifier: self.verifier,
            key_rings: &self.key_rings,
            distributions: &self.distributions,
            canonical: &self.canonical,
        };
        maven.run(log)?;
        drop(scratch);
        Ok(())
    }

    /// Resolve the base URL and find each project's release directory in it.
    fn load_release(&mut self, log: &mut VerificationLog<'_>) -> Result<Vec<String>> {
        let base_url = self.context.base_url.clone();
        log.step(0, format!("Load release URL \"{base_url}\"..."));
        let resolved = self.fetcher.source().resolve(&base_url)?;
        if resolved != base_url {
            log.step(1, format!("unshortened: {resolved}"));
            self.context.base_url = resolved;
        }
        let entries = self.fetcher.source().list(&self.context.base_url)?;
        self.config
            .project_names()
            .map(|project| {
                entries
                    .iter()
                    .find(|entry| {
                        entry.is_dir() && entry.name.trim_end_matches('/').eq_ignore_ascii_case(project)
                    })
                    .map(|entry| entry.url.clone())
                    .ok_or_else(|| SmokeError::precondition(format!("could not find {project} subdir")))
            })
            .collect()
    }

    fn check_project(&mut self, project: &ProjectConfig, url: &str, log: &mut VerificationLog<'_>) -> Result<()> {
        let name = project.name.as_str();
        log.raw("");
        log.step(0, format!("Test {name}..."));
        log.step(1, "test basics...");
        let entries = self.fetcher.source().list(url)?;
        let dir = ReleaseDirectory::parse(name, &entries, &self.context.version, &self.expected_suffixes())?;

        log.step(1, "get KEYS");
        let tmp_dir = self.context.tmp_dir.clone();
        let keys = self.fetcher.fetch(&format!("{name}.KEYS"), &dir.keys_url, &tmp_dir)?;
        let ring = if self.context.signed {
            let ring = KeyRing::prepare(self.runner, &self.config.gpg, &tmp_dir, name, &keys)?;
            self.key_rings.push(ring.clone());
            Some(ring)
        } else {
            None
        };

        self.check_changes_html(&dir.changes_url, log)?;

        // Binary archives first: the source checks may compare against them.
        let ordered = dir
            .artifacts
            .iter()
            .filter(|a| a.kind == PackageKind::Binary)
            .chain(dir.artifacts.iter().filter(|a| a.kind == PackageKind::Source));
        for artifact in ordered {
            let path = self.download(artifact, ring.as_ref(), log)?;
            self.check_artifact(project, artifact, &path, log)?;
        }
        Ok(())
    }

    fn expected_suffixes(&self) -> Vec<String> {
        let mut suffixes = self.config.digest_suffixes.clone();
        if self.context.signed {
            suffixes.push(self.config.signature_suffix.clone());
        }
        suffixes
    }

    fn check_changes_html(&self, changes_url: &str, log: &mut VerificationLog<'_>) -> Result<()> {
        log.step(1, "check changes HTML...");
        let document = self
            .fetcher
            .source()
            .list(changes_url)?
            .into_iter()
            .find(|entry| entry.name == CHANGES_HTML)
            .ok_or_else(|| ChangesError::MissingDocument {
                url: changes_url.to_owned(),
            })?;
        let text = read_text(self.fetcher.source(), &document.url)?;
        self.changes.check_html(&document.url, &text)?;
        Ok(())
    }

    /// Download `artifact` and check its digests and signature.
    fn download(
        &self,
        artifact: &Artifact,
        ring: Option<&KeyRing>,
        log: &mut VerificationLog<'_>,
    ) -> Result<PathBuf> {
        log.step(1, format!("download {}...", artifact.name));
        let path = self.fetcher.fetch(&artifact.name, &artifact.url, &self.context.tmp_dir)?;

        log.step(2, format!("verify {} digests", self.config.digest_suffixes.join("/")));
        let mut expected = Vec::with_capacity(self.config.digest_suffixes.len());
        for suffix in &self.config.digest_suffixes {
            let algorithm = DigestAlgorithm::from_suffix(suffix)
                .ok_or_else(|| SmokeError::precondition(format!("unsupported digest suffix {suffix}")))?;
            let digest_file = format!("{}.{suffix}", artifact.name);
            let text = read_text(self.fetcher.source(), &format!("{}.{suffix}", artifact.url))?;
            expected.push(ExpectedDigest {
                algorithm,
                hex: parse_listed_digest(&text, &digest_file, &artifact.name)?,
            });
        }
        verify_digests(&path, &expected)?;

        if let Some(ring) = ring {
            log.step(2, "verify sig");
            let suffix = &self.config.signature_suffix;
            let signature = self.fetcher.fetch(
                &format!("{}.{suffix}", artifact.name),
                &format!("{}.{suffix}", artifact.url),
                &self.context.tmp_dir,
            )?;
            for warning in self.verifier.verify(ring, &path, &signature)? {
                log.warn(warning);
            }
        }
        Ok(path)
    }

    /// Unpack `archive` and run every check that applies to its kind.
    fn check_artifact(
        &mut self,
        project: &ProjectConfig,
        artifact: &Artifact,
        archive: &Path,
        log: &mut VerificationLog<'_>,
    ) -> Result<()> {
        let name = project.name.as_str();
        let version = &self.context.version;
        log.step(1, format!("unpack {}...", artifact.name));
        let unpack_dir = self.context.tmp_dir.join("unpack").join(&artifact.name);
        let root = unpack(archive, &unpack_dir, &format!("{name}-{version}"))?;
        verify_layout(&root, name, &artifact.name, &project.layout, artifact.kind)?;
        self.canonical.record_from(name, &root)?;

        let env = self.context.command_env();
        let toolchain = Toolchain::new(self.runner, env.clone());
        match artifact.kind {
            PackageKind::Binary => {
                self.check_binary_packages(project, &root, log)?;
                if let Some(demo) = &project.demo {
                    toolchain.run_demo(name, &root, demo, PackageKind::Binary, version, log)?;
                }
                if let Some(service) = &project.service {
                    let check = ServiceCheck {
                        runner: self.runner,
                        source: self.fetcher.source(),
                        config: service,
                        env,
                    };
                    check.run(name, &root, log)?;
                }
                if ArchiveFormat::detect(archive) == Some(ArchiveFormat::TarGz) {
                    let index = DistributionIndex::build(&root)?;
                    log::debug!("indexed {} files of the {name} binary distribution", index.len());
                    self.distributions.insert(name.to_owned(), index);
                }
            }
            PackageKind::Source => {
                log.step(2, "make sure no packaged binaries in src dist...");
                verify_no_packages(&root, name, &artifact.name, &self.config.package)?;
                toolchain.run_steps(&root, &project.source_commands, &self.context.vars(name), log)?;
                if let Some(demo) = &project.demo {
                    toolchain.run_demo(name, &root, demo, PackageKind::Source, version, log)?;
                }
                if let Some(embedding) = &project.notice_embedding {
                    log.step(2, "check NOTICE");
                    check_notice_embedding(name, &root, embedding)?;
                }
            }
        }

        log.step(2, "check CHANGES.txt files...");
        let checked = self.changes.check_tree(&root, &project.changes)?;
        log::debug!("checked {checked} CHANGES.txt files in {}", artifact.name);
        Ok(())
    }

    fn check_binary_packages(&self, project: &ProjectConfig, root: &Path, log: &mut VerificationLog<'_>) -> Result<()> {
        let dependency = project.depends_on.as_deref().map(|dep| {
            self.distributions
                .get(dep)
                .map(|index| Dependency { project: dep, index })
                .ok_or_else(|| {
                    SmokeError::precondition(format!(
                        "{} depends on {dep}, whose binary distribution has not been verified",
                        project.name
                    ))
                })
        });
        let check = PackageCheck {
            project,
            rules: &self.config.package,
            version: self.context.version.as_str(),
            revision: &self.context.revision,
            canonical: &self.canonical,
            dependency: dependency.transpose()?,
        };
        check.check_tree(root, log)?;
        for war in &project.wars {
            check.check_war(&root.join(war), log)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

//! CLI argument definitions for the release smoke tester.
//!
//! Besides the clap parser this module derives the run parameters that
//! default from the release URL: the version, the build revision and the
//! scratch directory.

use crate::config::SmokeConfig;
use crate::error::{Result, SmokeError};
use crate::fetch::CachePolicy;
use crate::pipeline::first_free;
use crate::release::{ReleaseContext, ReleaseVersion, RevisionCheck, find_revision};
use camino::Utf8PathBuf;
use clap::Parser;
use std::path::PathBuf;

/// Smoke test a staged Lucene/Solr release candidate.
#[derive(Parser, Debug, Default)]
#[command(name = "release-smoketest")]
#[command(about, disable_version_flag = true)]
#[command(long_about = concat!(
    "Smoke test a staged Lucene/Solr release candidate.\n\n",
    "Every artifact published under the release URL is downloaded and checked: ",
    "digests and signatures, archive layout, embedded package metadata, the ",
    "changes documents, the source tree toolchain and the Maven repository, ",
    "which must agree byte for byte with the binary distributions. The Solr ",
    "binary distribution is started and queried before it is shut down.\n\n",
    "The first failing check aborts the run with a non-zero exit status.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Test a staged release candidate:\n",
    "    $ release-smoketest http://people.apache.org/~whoever/staging_area/lucene-solr-5.1.0-RC1-rev1672403\n\n",
    "  Test a local, unsigned build with extra test arguments:\n",
    "    $ release-smoketest --not-signed --revision skip file:///tmp/releases/5.1.0 -Dtests.slow=false\n\n",
    "  Resume in an existing scratch directory:\n",
    "    $ release-smoketest --tmp-dir /tmp/smoke --reuse-cache <URL>",
))]
pub struct Cli {
    /// URL (or local directory) of the staged release.
    #[arg(value_name = "URL")]
    pub url: String,

    /// Scratch directory to test inside [default: <tmp>/smoke_lucene_<version>_<revision>].
    #[arg(long, value_name = "PATH")]
    pub tmp_dir: Option<Utf8PathBuf>,

    /// The release is not signed.
    #[arg(long)]
    pub not_signed: bool,

    /// Build revision the release was built from [default: from the URL].
    #[arg(long, value_name = "REV")]
    pub revision: Option<String>,

    /// Release version [default: from the URL].
    #[arg(long, value_name = "X.Y.Z(-ALPHA|-BETA)")]
    pub version: Option<String>,

    /// Configuration file replacing the bundled one.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Java home used by toolchain, demo and service commands.
    #[arg(long, value_name = "DIR")]
    pub runtime_home: Option<Utf8PathBuf>,

    /// Reuse files already downloaded into the scratch directory.
    #[arg(long)]
    pub reuse_cache: bool,

    /// Suppress progress output (warnings and errors still shown).
    #[arg(short, long)]
    pub quiet: bool,

    /// Diagnostic log filter, e.g. `debug` [default: RUST_LOG, else warn].
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Arguments passed to source tree test commands, e.g. -Dtests.slow=false.
    #[arg(value_name = "TEST_ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub test_args: Vec<String>,
}

impl Cli {
    /// The release version, explicit or found in the URL.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::Precondition`] if an explicit version is
    /// malformed or the URL holds none.
    pub fn release_version(&self) -> Result<ReleaseVersion> {
        match &self.version {
            Some(version) => ReleaseVersion::parse(version),
            None => ReleaseVersion::find_in(&self.url)
                .ok_or_else(|| SmokeError::precondition(format!("could not find version in URL {}", self.url))),
        }
    }

    /// The build revision, explicit or found in the URL.
    #[must_use]
    pub fn revision(&self) -> Option<String> {
        self.revision.clone().or_else(|| find_revision(&self.url))
    }

    /// How files already in the scratch directory are treated.
    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        if self.reuse_cache {
            CachePolicy::Reuse
        } else {
            CachePolicy::ForceClean
        }
    }

    /// The scratch directory: `--tmp-dir` made absolute, or the first free
    /// `smoke_lucene_<version>_<revision>[_<n>]` below the system temp dir.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the current directory cannot be determined.
    pub fn scratch_dir(&self, version: &ReleaseVersion, revision: &RevisionCheck) -> Result<PathBuf> {
        match &self.tmp_dir {
            Some(dir) => Ok(std::path::absolute(dir.as_std_path())?),
            None => Ok(first_free(
                &std::env::temp_dir().join(format!("smoke_lucene_{version}_{}", revision.label())),
            )),
        }
    }

    /// Everything the pipeline needs to know about the release under test.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::Precondition`] if the version or, under the
    /// `required` policy, the revision cannot be determined.
    pub fn release_context(&self, config: &SmokeConfig) -> Result<ReleaseContext> {
        let version = self.release_version()?;
        let revision = RevisionCheck::resolve(self.revision().as_deref(), config.revision.policy)?;
        let tmp_dir = self.scratch_dir(&version, &revision)?;
        Ok(ReleaseContext {
            base_url: self.url.clone(),
            version,
            revision,
            signed: !self.not_signed,
            tmp_dir,
            test_args: self.test_args.join(" "),
            runtime_home: self.runtime_home.as_ref().map(|home| home.clone().into_std_path_buf()),
        })
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

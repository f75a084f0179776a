//! Release identity: version, revision and the artifacts a project publishes.

use crate::config::{RevisionPolicy, SmokeConfig};
use crate::error::{Result, SmokeError};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Revision token that disables the revision stamp check.
pub const SKIP_REVISION: &str = "skip";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\.(\d+)\.(\d+)(-ALPHA|-BETA)?").expect("version regex is valid")
});

static REVISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"rev(\d+)").expect("revision regex is valid"));

/// A release version such as `5.1.0` or `6.0.0-BETA`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseVersion {
    text: String,
    major: u32,
    minor: u32,
}

impl ReleaseVersion {
    /// Parse a version that must match the release version pattern exactly.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::Precondition`] if `text` is not a release version.
    pub fn parse(text: &str) -> Result<Self> {
        match Self::find_in(text) {
            Some(version) if version.text == text => Ok(version),
            _ => Err(SmokeError::precondition(format!(
                "version \"{text}\" does not match X.Y.Z(-ALPHA|-BETA)"
            ))),
        }
    }

    /// Find the first release version embedded in `text`, e.g. a URL.
    #[must_use]
    pub fn find_in(text: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(text)?;
        Some(Self {
            text: caps.get(0)?.as_str().to_owned(),
            major: caps.get(1)?.as_str().parse().ok()?,
            minor: caps.get(2)?.as_str().parse().ok()?,
        })
    }

    /// The version as published.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Major version component.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Minor version component.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// The version with trailing `.0` components removed, e.g. `5.0` for
    /// `5.0.0`.
    #[must_use]
    pub fn without_trailing_zeros(&self) -> &str {
        strip_trailing_zeros(&self.text)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Remove trailing `.0` components from a dotted version string.
#[must_use]
pub fn strip_trailing_zeros(version: &str) -> &str {
    let mut out = version;
    while let Some(stripped) = out.strip_suffix(".0") {
        out = stripped;
    }
    out
}

/// Find the build revision embedded in a release URL (`...-rev1234/`).
#[must_use]
pub fn find_revision(url: &str) -> Option<String> {
    REVISION_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// The revision stamp every package manifest must carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevisionCheck {
    /// Require `Implementation-Version: {version} {revision} `.
    Stamp(String),
    /// Do not check the revision stamp.
    Skip,
}

impl RevisionCheck {
    /// Resolve the revision check from an optional revision and the policy.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::Precondition`] when no revision is known and the
    /// policy requires one.
    pub fn resolve(revision: Option<&str>, policy: RevisionPolicy) -> Result<Self> {
        match (revision, policy) {
            (Some(SKIP_REVISION), _) | (None, RevisionPolicy::Optional) => Ok(Self::Skip),
            (Some(rev), _) => Ok(Self::Stamp(rev.to_owned())),
            (None, RevisionPolicy::Required) => Err(SmokeError::precondition(
                "no build revision given and none found in the release URL; \
                 pass --revision (or --revision skip)",
            )),
        }
    }

    /// Revision text used in file names and messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Stamp(rev) => rev,
            Self::Skip => SKIP_REVISION,
        }
    }
}

/// Package kind of a distribution artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackageKind {
    /// Prebuilt binary distribution.
    Binary,
    /// Source distribution.
    Source,
}

/// A distribution artifact published in a project's release directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// Owning project.
    pub project: String,
    /// File name, e.g. `lucene-5.1.0-src.tgz`.
    pub name: String,
    /// Package kind.
    pub kind: PackageKind,
    /// Where the artifact is published.
    pub url: String,
}

impl Artifact {
    /// The local path of this artifact inside `cache`.
    #[must_use]
    pub fn local_path(&self, cache: &Path) -> PathBuf {
        cache.join(&self.name)
    }
}

/// Expected distribution artifact names for `project`, in verification
/// order: source first, then the binary archives.
#[must_use]
pub fn expected_artifact_names(project: &str, version: &ReleaseVersion) -> Vec<(String, PackageKind)> {
    vec![
        (format!("{project}-{version}-src.tgz"), PackageKind::Source),
        (format!("{project}-{version}.tgz"), PackageKind::Binary),
        (format!("{project}-{version}.zip"), PackageKind::Binary),
    ]
}

/// Everything a run needs to know about the release under test.
#[derive(Clone, Debug)]
pub struct ReleaseContext {
    /// Base URL exposing one directory per project.
    pub base_url: String,
    /// Release version.
    pub version: ReleaseVersion,
    /// Revision stamp check.
    pub revision: RevisionCheck,
    /// Whether detached signatures are published.
    pub signed: bool,
    /// Exclusive scratch directory.
    pub tmp_dir: PathBuf,
    /// Extra arguments for source tree test commands.
    pub test_args: String,
    /// Runtime home exported to toolchain and service commands.
    pub runtime_home: Option<PathBuf>,
}

impl ReleaseContext {
    /// Directory listing URL of `project`.
    #[must_use]
    pub fn project_url(&self, project: &str) -> String {
        format!("{}/{project}/", self.base_url.trim_end_matches('/'))
    }

    /// Placeholder bindings shared by every templated setting.
    #[must_use]
    pub fn vars<'a>(&'a self, project: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![
            ("project", project),
            ("version", self.version.as_str()),
            ("revision", self.revision.label()),
            ("test_args", self.test_args.as_str()),
        ]
    }

    /// Environment overrides for external commands.
    #[must_use]
    pub fn command_env(&self) -> Vec<(String, String)> {
        let Some(home) = &self.runtime_home else {
            return Vec::new();
        };
        let path = std::env::var("PATH").unwrap_or_default();
        vec![
            ("JAVA_HOME".to_owned(), home.display().to_string()),
            (
                "PATH".to_owned(),
                format!("{}:{path}", home.join("bin").display()),
            ),
        ]
    }
}

/// Validate that every configured project name is usable in file names.
///
/// # Errors
///
/// Returns [`SmokeError::Precondition`] for a name containing a path
/// separator.
pub fn check_project_names(config: &SmokeConfig) -> Result<()> {
    for name in config.project_names() {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(SmokeError::precondition(format!(
                "project name \"{name}\" cannot be used as a path component"
            )));
        }
    }
    Ok(())
}

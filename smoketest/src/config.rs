//! Smoke test configuration.
//!
//! Everything that tracks the contents of a particular release line lives here
//! as data rather than code: layout manifests, allow-lists of extra module
//! directories, required manifest lines, namespace exemptions, toolchain
//! commands and the service smoke test. A default configuration for the
//! Lucene/Solr release line is compiled into the binary; `--config` replaces it
//! wholesale.

use crate::verify::DigestAlgorithm;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// The configuration bundled with the binary.
const BUNDLED_CONFIG: &str = include_str!("../config/default.toml");

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {}: {source}", path.display())]
    Read {
        /// Path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for [`SmokeConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but is internally inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Description of the inconsistency.
        reason: String,
    },
}

/// Top-level smoke test configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SmokeConfig {
    /// Digest suffixes published next to every artifact, e.g. `md5`, `sha1`.
    pub digest_suffixes: Vec<String>,
    /// Suffix of detached signature files.
    pub signature_suffix: String,
    /// How a missing build revision is treated.
    #[serde(default)]
    pub revision: RevisionConfig,
    /// Rules for packaged binaries (jar/war files).
    pub package: PackageRules,
    /// gpg invocation settings.
    pub gpg: GpgConfig,
    /// Maven repository cross-validation settings.
    pub maven: MavenConfig,
    /// Per-project settings, in the order the projects are verified.
    pub projects: Vec<ProjectConfig>,
}

/// Revision stamp policy.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RevisionConfig {
    /// What to do when no revision is supplied.
    #[serde(default)]
    pub policy: RevisionPolicy,
}

/// Whether a build revision must be known before the run starts.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RevisionPolicy {
    /// A missing revision is a precondition failure.
    #[default]
    Required,
    /// A missing revision skips the `Implementation-Version` stamp check.
    Optional,
}

/// Metadata rules applied to every packaged binary.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageRules {
    /// Path of the manifest entry inside a package.
    pub manifest_entry: String,
    /// Path of the notice entry inside a package.
    pub notice_entry: String,
    /// Path of the license entry inside a package.
    pub license_entry: String,
    /// Lines that must appear in the manifest; `{version}` is expanded.
    pub required_manifest_lines: Vec<String>,
    /// Line proving the build revision; `{version}` and `{revision}` expand.
    pub revision_line: String,
    /// Class entry prefixes no package may contain.
    pub forbidden_class_prefixes: Vec<String>,
    /// File extensions of packaged binaries.
    pub binary_extensions: Vec<String>,
}

impl PackageRules {
    /// Whether `name` is a packaged binary.
    #[must_use]
    pub fn is_package(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.binary_extensions.iter().any(|known| known == ext))
    }
}

/// gpg invocation settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GpgConfig {
    /// gpg executable.
    pub program: String,
    /// Warning expected only when verifying against the clean key ring.
    pub untrusted_key_warning: String,
    /// Warnings that are never reported.
    #[serde(default)]
    pub ignored_warnings: Vec<String>,
}

/// Maven repository cross-validation settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MavenConfig {
    /// Repository path of a project's group, e.g. `org/apache/{project}`.
    pub group_path: String,
    /// Directory listing that holds release branches.
    #[serde(default)]
    pub branches_url: Option<String>,
    /// Release branch entry name, e.g. `lucene_solr_{major}_{minor}/`.
    pub release_branch: String,
    /// Path of the POM templates below a branch or working copy root.
    pub templates_path: String,
    /// File name of a POM template.
    pub template_file_name: String,
    /// Names skipped while crawling the release branch.
    #[serde(default)]
    pub crawl_exclusions: Vec<String>,
    /// Local working copy used when no release branch is found.
    #[serde(default)]
    pub local_checkout: Option<PathBuf>,
}

/// Per-project settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project name; also the artifact prefix.
    pub name: String,
    /// Project whose binary distribution this project re-publishes jars of.
    #[serde(default)]
    pub depends_on: Option<String>,
    /// War files, relative to the unpacked binary root, to inspect.
    #[serde(default)]
    pub wars: Vec<String>,
    /// Layout manifest.
    pub layout: LayoutConfig,
    /// Locations where forbidden namespaces are tolerated.
    #[serde(default)]
    pub namespace_exemptions: Vec<NamespaceExemption>,
    /// Notice of another project that must be embedded verbatim.
    #[serde(default)]
    pub notice_embedding: Option<NoticeEmbedding>,
    /// Changes document rules.
    pub changes: ChangesRules,
    /// Toolchain commands run inside an unpacked source tree.
    #[serde(default)]
    pub source_commands: Vec<ToolchainStep>,
    /// Demo index/search round trip.
    #[serde(default)]
    pub demo: Option<DemoConfig>,
    /// Live service smoke test run against the binary distribution.
    #[serde(default)]
    pub service: Option<ServiceConfig>,
}

/// Expected top-level entries of an unpacked artifact.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    /// Text files (without `.txt`) required in every package kind.
    pub text_files: Vec<String>,
    /// Additional text files required in binary packages.
    #[serde(default)]
    pub binary_text_files: Vec<String>,
    /// Additional text files required in source packages.
    #[serde(default)]
    pub source_text_files: Vec<String>,
    /// Entries required in binary packages.
    #[serde(default)]
    pub binary_entries: Vec<String>,
    /// Entries required in source packages.
    #[serde(default)]
    pub source_entries: Vec<String>,
    /// Extra entries a source package may carry.
    #[serde(default)]
    pub source_allow_list: Vec<String>,
}

/// A directory (and optionally a file name prefix) exempt from the
/// forbidden-namespace scan.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NamespaceExemption {
    /// Suffix of the directory holding the package, using `/` separators.
    pub dir_suffix: String,
    /// Prefix of the package file name; all files match when absent.
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl NamespaceExemption {
    /// Whether `file_name` inside `dir` is exempt.
    #[must_use]
    pub fn matches(&self, dir: &str, file_name: &str) -> bool {
        dir.ends_with(&self.dir_suffix)
            && self
                .file_prefix
                .as_deref()
                .is_none_or(|prefix| file_name.starts_with(prefix))
    }
}

/// A notice that must be embedded in this project's source notice.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NoticeEmbedding {
    /// Project whose notice is embedded.
    pub of: String,
    /// Location of that notice inside this project's source tree.
    pub path: String,
    /// Text preceding the embedded notice.
    pub header: String,
    /// Text following the embedded notice.
    pub footer: String,
}

/// Changes document rules.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChangesRules {
    /// Text every `CHANGES.txt` must contain; `{version}` is expanded.
    pub heading: String,
    /// Path fragments whose `CHANGES.txt` may omit the heading.
    #[serde(default)]
    pub exempt_paths: Vec<String>,
}

/// A command run inside an unpacked source tree.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolchainStep {
    /// Progress description.
    pub description: String,
    /// Shell command; `{test_args}` and `{version}` are expanded.
    pub command: String,
    /// Log file name, created inside the unpacked root.
    pub log: String,
    /// Working directory relative to the unpacked root.
    #[serde(default)]
    pub dir: Option<String>,
}

/// Demo index/search round trip.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DemoConfig {
    /// Classpath used against a binary distribution.
    pub binary_classpath: String,
    /// Classpath used against a built source tree.
    pub source_classpath: String,
    /// Documents indexed in a binary distribution.
    pub binary_docs: String,
    /// Documents indexed in a source tree.
    pub source_docs: String,
    /// Index command; `{classpath}` and `{docs}` are expanded.
    pub index_command: String,
    /// Search command; must print `N total matching documents`.
    pub search_command: String,
    /// Index checker command; must print `version=...`.
    pub check_index_command: String,
    /// Minimum number of hits the search must report.
    pub min_hits: u64,
}

/// A program invocation described in configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandSpec {
    /// A shell command line.
    Shell {
        /// Command line passed to `sh -c`.
        shell: String,
        /// Working directory relative to the service root.
        #[serde(default)]
        dir: Option<String>,
    },
    /// A program with explicit arguments.
    Exec {
        /// Program path, relative to the service root or on `PATH`.
        program: String,
        /// Program arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Working directory relative to the service root.
        #[serde(default)]
        dir: Option<String>,
    },
}

/// Live service smoke test settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory, relative to the unpacked root, the service runs from.
    #[serde(default)]
    pub dir: Option<String>,
    /// Launch command; must stay in the foreground.
    pub launch: CommandSpec,
    /// Graceful stop command.
    #[serde(default)]
    pub stop: Option<CommandSpec>,
    /// Substrings that must all appear in one output line to signal startup.
    pub startup_markers: Vec<String>,
    /// Upper bound on startup, in seconds.
    pub startup_timeout_secs: u64,
    /// Grace period for each shutdown step, in seconds.
    pub shutdown_grace_secs: u64,
    /// Log file name, created inside the service directory.
    pub log_file: String,
    /// Requests issued once the service is ready.
    pub functional: FunctionalConfig,
}

impl ServiceConfig {
    /// Startup bound as a [`Duration`].
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Functional requests issued against a ready service.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FunctionalConfig {
    /// Commands that prepare the service (create cores, etc).
    #[serde(default)]
    pub setup: Vec<CommandSpec>,
    /// Commands that index the fixed document set.
    pub index: Vec<CommandSpec>,
    /// Query URL.
    pub query_url: String,
    /// Regex with one capture group holding the result count.
    pub count_pattern: String,
    /// Exact number of results the query must return.
    pub expected_count: u64,
}

impl SmokeConfig {
    /// Parse the configuration bundled with the binary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the bundled file is malformed.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUNDLED_CONFIG)
    }

    /// Load configuration from `path`, or the bundled default when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            None => Self::bundled(),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })?;
                Self::from_toml_str(&text)
            }
        }
    }

    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML or the resulting
    /// configuration is inconsistent.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a project by name.
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Names of all configured projects.
    pub fn project_names(&self) -> impl Iterator<Item = &str> {
        self.projects.iter().map(|p| p.name.as_str())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.digest_suffixes.is_empty() {
            return Err(invalid("at least one digest suffix is required"));
        }
        if let Some(unknown) = self
            .digest_suffixes
            .iter()
            .find(|suffix| DigestAlgorithm::from_suffix(suffix).is_none())
        {
            return Err(invalid(format!("unsupported digest suffix {unknown}")));
        }
        if self.projects.is_empty() {
            return Err(invalid("at least one project is required"));
        }
        let mut seen = BTreeSet::new();
        for project in &self.projects {
            if !seen.insert(project.name.as_str()) {
                return Err(invalid(format!("duplicate project {}", project.name)));
            }
        }
        for project in &self.projects {
            let references = project
                .depends_on
                .iter()
                .chain(project.notice_embedding.as_ref().map(|n| &n.of));
            for other in references {
                if !seen.contains(other.as_str()) || other == &project.name {
                    return Err(invalid(format!(
                        "project {} refers to unknown project {other}",
                        project.name
                    )));
                }
            }
            if let Some(service) = &project.service {
                if service.startup_markers.is_empty() {
                    return Err(invalid(format!(
                        "project {} service needs at least one startup marker",
                        project.name
                    )));
                }
                regex::Regex::new(&service.functional.count_pattern).map_err(|e| {
                    invalid(format!(
                        "project {} count_pattern is not a valid regex: {e}",
                        project.name
                    ))
                })?;
            }
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

/// Expand `{name}` placeholders in `template`.
///
/// Unknown placeholders are left untouched.
///
/// # Examples
///
/// ```
/// use smoketest::config::expand;
///
/// let line = expand("Specification-Version: {version}", &[("version", "5.0.0")]);
/// assert_eq!(line, "Specification-Version: 5.0.0");
/// ```
#[must_use]
pub fn expand(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_owned(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

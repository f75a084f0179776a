//! Shape of a project's release directory.
//!
//! The listing must hold the key bundle, the Maven subtree, one changes
//! directory and exactly the three distribution archives, each followed by
//! its suffix files.

use crate::error::{Result, SmokeError};
use crate::fetch::DirEntry;
use crate::release::{Artifact, ReleaseVersion, expected_artifact_names};

/// Name of the published key bundle.
pub const KEYS: &str = "KEYS";
/// Name of the Maven subtree.
pub const MAVEN_DIR: &str = "maven/";

/// The entries a verified release directory points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseDirectory {
    /// URL of the key bundle.
    pub keys_url: String,
    /// URL of the Maven subtree.
    pub maven_url: String,
    /// URL of the changes directory.
    pub changes_url: String,
    /// Distribution archives, in listing order.
    pub artifacts: Vec<Artifact>,
}

/// An artifact being collected together with the suffix files after it.
struct Pending {
    name: String,
    url: String,
    suffixes: Vec<String>,
}

impl ReleaseDirectory {
    /// Group `entries` into artifacts and their suffix files and check the
    /// result against the release conventions.
    ///
    /// `suffixes` is the exact set every artifact must carry.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::ReleaseLayout`] for an unknown artifact or
    /// changes directory, a wrong suffix set, a wrong artifact set, or a
    /// missing `KEYS`, `maven/` or changes entry.
    pub fn parse(
        project: &str,
        entries: &[DirEntry],
        version: &ReleaseVersion,
        suffixes: &[String],
    ) -> Result<Self> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let mut expected_suffixes = suffixes.to_vec();
        expected_suffixes.sort();

        let prefix = format!("{project}-{version}");
        let changes_dir = format!("changes-{version}/");
        let mut keys_url = None;
        let mut maven_url = None;
        let mut changes_url = None;
        let mut closed = Vec::new();
        let mut current: Option<Pending> = None;
        for entry in sorted {
            let name = entry.name.as_str();
            if name == KEYS {
                keys_url = Some(entry.url);
            } else if name == MAVEN_DIR {
                maven_url = Some(entry.url);
            } else if name.starts_with("changes") {
                if name != "changes/" && name != changes_dir {
                    return Err(SmokeError::release_layout(
                        project,
                        format!("found {name} vs expected {changes_dir}"),
                    ));
                }
                changes_url = Some(entry.url);
            } else if let Some((pending, suffix)) = current
                .as_mut()
                .and_then(|p| suffix_of(name, &p.name).map(|suffix| (p, suffix)))
            {
                pending.suffixes.push(suffix);
            } else {
                if !name.starts_with(&prefix) {
                    return Err(SmokeError::release_layout(
                        project,
                        format!("unknown artifact {name}: expected prefix {prefix}"),
                    ));
                }
                if let Some(done) = current.take() {
                    closed.push(close(project, done, &expected_suffixes)?);
                }
                current = Some(Pending {
                    name: entry.name,
                    url: entry.url,
                    suffixes: Vec::new(),
                });
            }
        }
        if let Some(done) = current.take() {
            closed.push(close(project, done, &expected_suffixes)?);
        }

        let expected = expected_artifact_names(project, version);
        let actual: Vec<_> = closed.iter().map(|(name, _)| name.as_str()).collect();
        let wanted: Vec<_> = expected.iter().map(|(name, _)| name.as_str()).collect();
        if actual != wanted {
            return Err(SmokeError::release_layout(
                project,
                format!("wrong artifacts: expected {wanted:?} but got {actual:?}"),
            ));
        }
        let artifacts = closed
            .into_iter()
            .zip(expected)
            .map(|((name, url), (_, kind))| Artifact {
                project: project.to_owned(),
                name,
                kind,
                url,
            })
            .collect();

        Ok(Self {
            keys_url: keys_url.ok_or_else(|| SmokeError::release_layout(project, "missing KEYS"))?,
            maven_url: maven_url.ok_or_else(|| SmokeError::release_layout(project, "missing maven"))?,
            changes_url: changes_url
                .ok_or_else(|| SmokeError::release_layout(project, format!("missing changes-{version}")))?,
            artifacts,
        })
    }
}

/// The suffix of `name` if it is a suffix file of `artifact`.
fn suffix_of(name: &str, artifact: &str) -> Option<String> {
    name.strip_prefix(artifact)?.strip_prefix('.').map(str::to_owned)
}

fn close(project: &str, pending: Pending, expected: &[String]) -> Result<(String, String)> {
    let mut actual = pending.suffixes;
    actual.sort();
    if actual != expected {
        return Err(SmokeError::release_layout(
            project,
            format!(
                "artifact {} has wrong sigs: expected {expected:?} but got {actual:?}",
                pending.name
            ),
        ));
    }
    Ok((pending.name, pending.url))
}

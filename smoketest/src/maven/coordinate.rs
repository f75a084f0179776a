//! Maven coordinates read from POM files.

use roxmltree::{Document, Node};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// XML namespace of a Maven 4.0.0 POM.
pub const POM_NAMESPACE: &str = "http://maven.apache.org/POM/4.0.0";

/// Errors raised while correlating the Maven repository.
#[derive(Debug, Error)]
pub enum CoordinateError {
    /// A POM is not well-formed XML.
    #[error("failed to parse POM {}: {reason}", pom.display())]
    Parse {
        /// The POM file.
        pom: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A POM lacks a coordinate element.
    #[error("POM {} has no {element}", pom.display())]
    MissingElement {
        /// The POM file.
        pom: PathBuf,
        /// The missing element.
        element: &'static str,
    },

    /// A deployed POM's coordinate disagrees with its path.
    #[error("mismatch between POM coordinate {coordinate} and filepath: {}", pom.display())]
    PathMismatch {
        /// `group:artifact:version` declared in the POM.
        coordinate: String,
        /// Where the POM was found.
        pom: PathBuf,
    },

    /// A deployed POM has no artifact of its declared packaging.
    #[error("missing corresponding .{packaging} artifact for POM {}", pom.display())]
    MissingArtifact {
        /// Declared packaging.
        packaging: String,
        /// The POM file.
        pom: PathBuf,
    },

    /// A binary artifact has no POM.
    #[error("missing: POM for {}", artifact.display())]
    MissingPom {
        /// The binary artifact.
        artifact: PathBuf,
    },

    /// A POM template has no deployed artifact.
    #[error("missing artifact {} for POM template {}", artifact.display(), template.display())]
    MissingTemplateArtifact {
        /// The template.
        template: PathBuf,
        /// Where the artifact was expected.
        artifact: PathBuf,
    },

    /// A required companion file (javadoc, sources, digest, signature) is
    /// absent.
    #[error("missing: {} for {}", companion.display(), artifact.display())]
    MissingCompanion {
        /// The artifact.
        artifact: PathBuf,
        /// The expected companion.
        companion: PathBuf,
    },

    /// No POM templates of the required kind were found.
    #[error("no {kind} POM templates found at {location}")]
    NoTemplates {
        /// Template kind (a project name or "grandfather").
        kind: String,
        /// Where templates were looked for.
        location: String,
    },

    /// A POM could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The unreadable file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// `(groupId, artifactId, version, packaging)` of a POM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coordinate {
    /// Dotted group id.
    pub group_id: String,
    /// Artifact id.
    pub artifact_id: String,
    /// Declared version; uninterpolated in templates.
    pub version: String,
    /// Packaging kind, `jar` when not declared.
    pub packaging: String,
}

impl Coordinate {
    /// Parse the coordinate of the POM text `xml` read from `pom`.
    ///
    /// `groupId` and `version` fall back to the `parent` element.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::Parse`] for malformed XML and
    /// [`CoordinateError::MissingElement`] when a coordinate is absent.
    pub fn parse(xml: &str, pom: &Path) -> Result<Self, CoordinateError> {
        let doc = parse_document(xml, pom)?;
        let project = doc.root_element();
        let parent = child(project, "parent");
        let inherited = |name: &'static str| {
            child_text(project, name)
                .or_else(|| parent.and_then(|p| child_text(p, name)))
                .ok_or_else(|| missing(pom, name))
        };
        Ok(Self {
            group_id: inherited("groupId")?,
            artifact_id: child_text(project, "artifactId").ok_or_else(|| missing(pom, "artifactId"))?,
            version: inherited("version")?,
            packaging: child_text(project, "packaging").unwrap_or_else(|| "jar".to_owned()),
        })
    }

    /// Read and parse a POM file.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::Io`] if the file cannot be read, otherwise
    /// as [`Coordinate::parse`].
    pub fn read(pom: &Path) -> Result<Self, CoordinateError> {
        Self::parse(&read_pom(pom)?, pom)
    }

    /// Repository path of this coordinate's `extension` file at `version`:
    /// `group/path/artifact/version/artifact-version.extension`.
    #[must_use]
    pub fn repository_path(&self, version: &str, extension: &str) -> PathBuf {
        let mut path: PathBuf = self.group_id.split('.').collect();
        path.push(&self.artifact_id);
        path.push(version);
        path.push(format!("{}-{version}.{extension}", self.artifact_id));
        path
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

/// Whether a POM disables deployment through
/// `maven-deploy-plugin`'s `configuration/skip`.
///
/// # Errors
///
/// Returns [`CoordinateError::Parse`] for malformed XML.
pub fn deploy_skipped(xml: &str, pom: &Path) -> Result<bool, CoordinateError> {
    let doc = parse_document(xml, pom)?;
    let plugins = child(doc.root_element(), "build").and_then(|build| child(build, "plugins"));
    let mut skipped = false;
    for plugin in plugins.iter().flat_map(|p| p.children()).filter(|n| is_pom_element(*n, "plugin")) {
        if child_text(plugin, "artifactId").as_deref() != Some("maven-deploy-plugin") {
            continue;
        }
        if let Some(skip) = child(plugin, "configuration").and_then(|c| child_text(c, "skip")) {
            skipped = skip.eq_ignore_ascii_case("true");
        }
    }
    Ok(skipped)
}

/// Read a POM file as text.
///
/// # Errors
///
/// Returns [`CoordinateError::Io`] if the file cannot be read.
pub fn read_pom(pom: &Path) -> Result<String, CoordinateError> {
    std::fs::read_to_string(pom).map_err(|source| CoordinateError::Io {
        path: pom.to_owned(),
        source,
    })
}

fn parse_document<'a>(xml: &'a str, pom: &Path) -> Result<Document<'a>, CoordinateError> {
    Document::parse(xml).map_err(|e| CoordinateError::Parse {
        pom: pom.to_owned(),
        reason: e.to_string(),
    })
}

fn is_pom_element(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(POM_NAMESPACE)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_pom_element(*n, name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name).map(|n| n.text().unwrap_or_default().trim().to_owned())
}

fn missing(pom: &Path, element: &'static str) -> CoordinateError {
    CoordinateError::MissingElement {
        pom: pom.to_owned(),
        element,
    }
}

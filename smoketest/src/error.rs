//! Error types for the release smoke tester.
//!
//! Every variant is fatal to the run: a release candidate with a single defect
//! must not be promoted. Messages name the failing check together with the
//! file, URL or command involved and, where they exist, the expected and
//! actual values so a release manager can reproduce the failure by hand.

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::inspect::changes::ChangesError;
use crate::inspect::metadata::MetadataError;
use crate::inspect::unpack::ExtractionError;
use crate::maven::coordinate::CoordinateError;
use crate::service::ServiceError;
use crate::verify::digest::DigestError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a smoke test run.
#[derive(Debug, Error)]
pub enum SmokeError {
    /// A precondition of the run itself does not hold.
    #[error("precondition failed: {reason}")]
    Precondition {
        /// Description of the violated precondition.
        reason: String,
    },

    /// The run configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A download failed even after the single retry.
    #[error(transparent)]
    DownloadFailure(#[from] FetchError),

    /// A published digest does not match the artifact content.
    #[error(transparent)]
    DigestMismatch(#[from] DigestError),

    /// `gpg --verify` rejected a detached signature.
    #[error("signature verification failed for {artifact}; see log file {}", log.display())]
    SignatureInvalid {
        /// The artifact whose signature was rejected.
        artifact: String,
        /// Log file holding the gpg output.
        log: PathBuf,
    },

    /// The release directory listing does not have the expected shape.
    #[error("{project}: {reason}")]
    ReleaseLayout {
        /// Project whose release directory is malformed.
        project: String,
        /// What was wrong with the listing.
        reason: String,
    },

    /// An archive could not be unpacked.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// An unpacked tree does not match its layout manifest.
    #[error("{project}: {reason} in artifact {artifact}")]
    LayoutMismatch {
        /// Project that owns the artifact.
        project: String,
        /// The unpacked artifact file name.
        artifact: String,
        /// Missing or unexpected entries.
        reason: String,
    },

    /// Embedded package metadata is missing or wrong.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A deployed coordinate file disagrees with its path or its artifacts.
    #[error(transparent)]
    CoordinateMismatch(#[from] CoordinateError),

    /// The same artifact was published twice with different bytes.
    #[error("artifact {} is not identical to {} in the {project} binary distribution", artifact.display(), distributed.display())]
    ByteIdenticalMismatch {
        /// The artifact that diverges.
        artifact: PathBuf,
        /// Its counterpart from the binary distribution.
        distributed: PathBuf,
        /// Project whose binary distribution was consulted.
        project: String,
    },

    /// A re-published artifact has no counterpart in the binary distribution.
    #[error("artifact {artifact} is not present in the {project} binary distribution")]
    MissingFromDistribution {
        /// The re-published artifact.
        artifact: String,
        /// Project whose binary distribution was consulted.
        project: String,
    },

    /// A changes document failed validation.
    #[error(transparent)]
    Changes(#[from] ChangesError),

    /// The launched service did not start, or failed its functional checks.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// An external command exited unsuccessfully.
    #[error("command \"{command}\" failed; see log file {}", log.display())]
    ExternalCommandFailure {
        /// The command line that was run.
        command: String,
        /// Log file holding the combined command output.
        log: PathBuf,
    },

    /// An external command could not be started or waited on.
    #[error("could not run \"{command}\": {source}")]
    CommandSpawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The demo round trip produced unexpected output.
    #[error("{project} demo: {reason}; see log file {}", log.display())]
    DemoFailure {
        /// Project whose demo ran.
        project: String,
        /// What was wrong with the output.
        reason: String,
        /// Log file holding the output.
        log: PathBuf,
    },

    /// A source notice does not embed its dependency's notice.
    #[error("{project}'s NOTICE.txt does not have the verbatim copy, plus header/footer, of {of}'s NOTICE.txt")]
    NoticeNotEmbedded {
        /// Project whose notice was checked.
        project: String,
        /// Project whose notice must be embedded.
        of: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SmokeError {
    /// Build a [`SmokeError::Precondition`] from any displayable reason.
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    /// Build a [`SmokeError::ReleaseLayout`] for `project`.
    pub fn release_layout(project: &str, reason: impl Into<String>) -> Self {
        Self::ReleaseLayout {
            project: project.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using [`SmokeError`].
pub type Result<T> = std::result::Result<T, SmokeError>;

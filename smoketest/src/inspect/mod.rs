//! Inspection of unpacked distributions and the packages inside them.

pub mod canonical;
pub mod changes;
pub mod layout;
pub mod metadata;
pub mod packages;
pub mod toolchain;
pub mod unpack;

pub use canonical::{CanonicalText, CanonicalTexts};
pub use changes::{ChangesChecker, ChangesError};
pub use layout::{verify_layout, verify_no_packages};
pub use metadata::{MetadataError, PackageSource, check_metadata, scan_namespaces};
pub use packages::{Dependency, DistributionIndex, PackageCheck, files_identical};
pub use toolchain::{Toolchain, check_notice_embedding};
pub use unpack::{ExtractionError, unpack};

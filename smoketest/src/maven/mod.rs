//! Maven repository checks: POM coordinates, templates and cross-validation
//! against the binary distributions.

pub mod coordinate;
pub mod crossval;
pub mod templates;

pub use coordinate::{Coordinate, CoordinateError};
pub use crossval::{MavenArtifacts, MavenCheck};
pub use templates::PomTemplates;

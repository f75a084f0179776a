//! Integrity checks: digests, signatures, and the external command boundary
//! they share with the rest of the pipeline.

pub mod command;
pub mod digest;
pub mod signature;

pub use command::{CommandRequest, CommandRunner, SystemRunner, run_logged};
pub use digest::{DigestAlgorithm, DigestError, ExpectedDigest, verify_digests};
pub use signature::{GpgVerifier, KeyRing, SignatureVerifier};

//! Release smoke tester library.
//!
//! This crate verifies that a staged Lucene/Solr release candidate is
//! internally consistent, correctly signed, correctly packaged and
//! operable before it is promoted. It is used by the `release-smoketest`
//! binary; the external boundaries (release source, command runner,
//! signature verifier) are traits so the pipeline can be driven against a
//! local tree in tests.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Versioned release-line rules, loaded from TOML
//! - [`error`] - The run-level error taxonomy
//! - [`fetch`] - Downloading, listing and crawling release resources
//! - [`inspect`] - Unpacked tree, package metadata and changes checks
//! - [`maven`] - Maven repository cross-validation
//! - [`output`] - Progress trail and console output
//! - [`pipeline`] - End-to-end orchestration of a run
//! - [`release`] - Release version, revision and artifact naming
//! - [`service`] - Live service smoke test
//! - [`verify`] - Digests, signatures and the external command boundary

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod inspect;
pub mod maven;
pub mod output;
pub mod pipeline;
pub mod release;
pub mod service;
pub mod verify;

#[cfg(test)]
mod test_utils;

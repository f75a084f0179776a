//! Functional requests against a ready service.

use super::ServiceError;
use crate::config::FunctionalConfig;
use crate::error::Result;
use crate::fetch::{ReleaseSource, read_text};
use crate::output::VerificationLog;
use crate::verify::{CommandRequest, CommandRunner, run_logged};
use regex::Regex;
use std::path::Path;

/// Setup, indexing and the query check.
pub struct FunctionalCheck<'a> {
    /// Runs setup and index commands.
    pub runner: &'a dyn CommandRunner,
    /// Issues the query.
    pub source: &'a dyn ReleaseSource,
    /// Functional settings.
    pub config: &'a FunctionalConfig,
    /// Environment overrides.
    pub env: &'a [(String, String)],
}

impl FunctionalCheck<'_> {
    /// Run every setup and index command from `dir`, then query and compare
    /// the result count.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SmokeError::ExternalCommandFailure`] for a
    /// failing command and [`ServiceError::FunctionalFailure`] for a wrong
    /// count.
    pub fn run(&self, dir: &Path, log: &mut VerificationLog<'_>) -> Result<()> {
        let commands = self
            .config
            .setup
            .iter()
            .map(|spec| ("setup", spec))
            .chain(self.config.index.iter().map(|spec| ("index", spec)));
        for (n, (phase, spec)) in commands.enumerate() {
            let request = CommandRequest::from_spec(spec, dir).with_env(self.env.iter().cloned());
            log.step(3, format!("{phase}: {}", request.display()));
            run_logged(self.runner, &request, &dir.join(format!("service-{phase}-{n}.log")), log)?;
        }

        log.step(3, "run query...");
        let url = &self.config.query_url;
        let body = read_text(self.source, url).map_err(ServiceError::from)?;
        let actual = count_results(&body, &self.config.count_pattern)?;
        if actual != Some(self.config.expected_count) {
            log.raw(format!("FAILED: response is:\n{body}"));
            return Err(ServiceError::FunctionalFailure {
                url: url.clone(),
                expected: self.config.expected_count,
                actual: actual.map_or_else(|| "no".to_owned(), |n| n.to_string()),
            }
            .into());
        }
        Ok(())
    }
}

/// The result count captured by `pattern`'s first group, if it matches.
///
/// # Errors
///
/// Returns [`ServiceError::Pattern`] if `pattern` is not a valid regex.
///
/// # Examples
///
/// ```
/// use smoketest::service::count_results;
///
/// let body = r#"<result name="response" numFound="3" start="0">"#;
/// assert_eq!(count_results(body, r#"numFound="(\d+)""#)?, Some(3));
/// # Ok::<(), smoketest::service::ServiceError>(())
/// ```
pub fn count_results(body: &str, pattern: &str) -> std::result::Result<Option<u64>, ServiceError> {
    let pattern = Regex::new(pattern)?;
    Ok(pattern
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok()))
}

//! Live service smoke test.
//!
//! The service is launched in the foreground from an unpacked binary
//! distribution. A reader thread copies its combined output into a log file
//! and watches for the startup markers; once they appear the functional
//! requests run. Shutdown always runs, escalating from the configured stop
//! command to a kill, and a process that survives both is reported rather
//! than waited on.

pub mod functional;
pub mod session;
pub mod signals;

pub use functional::{FunctionalCheck, count_results};
pub use session::ServiceSession;
pub use signals::{StartupSignals, StartupState};

use crate::config::{CommandSpec, ServiceConfig};
use crate::error::{Result, SmokeError};
use crate::fetch::{FetchError, ReleaseSource};
use crate::output::VerificationLog;
use crate::verify::{CommandRequest, CommandRunner};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the live service smoke test.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No startup marker appeared within the startup bound.
    #[error("service startup took more than {} seconds; see log {}", timeout_secs, log.display())]
    StartupTimeout {
        /// The startup bound, in seconds.
        timeout_secs: u64,
        /// Service log file.
        log: PathBuf,
    },

    /// Output ended, or the process exited, before startup completed.
    #[error("failure on service startup; see log {}", log.display())]
    StartupFailed {
        /// Service log file.
        log: PathBuf,
    },

    /// Reading the service output failed after startup.
    #[error("failure while reading service output; see log {}", log.display())]
    OutputFailed {
        /// Service log file.
        log: PathBuf,
    },

    /// The query returned an unexpected result count.
    #[error("query {url} returned {actual} results but expected {expected}")]
    FunctionalFailure {
        /// Query URL.
        url: String,
        /// Configured result count.
        expected: u64,
        /// What the response reported.
        actual: String,
    },

    /// The query could not be issued.
    #[error("query on service failed: {0}")]
    Query(#[from] FetchError),

    /// The configured result count pattern is not a valid regex.
    #[error("invalid result count pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The service process could not be started or its log written.
    #[error("failed to launch service from {}: {source}", dir.display())]
    Launch {
        /// Directory the service runs from.
        dir: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Runs the live service smoke test for one project.
pub struct ServiceCheck<'a> {
    /// Runs stop and functional commands.
    pub runner: &'a dyn CommandRunner,
    /// Issues the functional query.
    pub source: &'a dyn ReleaseSource,
    /// Service settings.
    pub config: &'a ServiceConfig,
    /// Environment overrides for every command.
    pub env: Vec<(String, String)>,
}

impl ServiceCheck<'_> {
    /// Launch the service from `root`, wait for startup, run the functional
    /// requests and shut it down.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] variants for startup and functional failures
    /// and command failures from the functional setup.
    pub fn run(&self, project: &str, root: &Path, log: &mut VerificationLog<'_>) -> Result<()> {
        let dir = self
            .config
            .dir
            .as_deref()
            .map_or_else(|| root.to_owned(), |d| root.join(d));
        let log_path = dir.join(&self.config.log_file);
        let stop = self.config.stop.as_ref().map(|spec| self.request(spec, &dir));
        if let Some(stop) = &stop {
            // A previous run may have left an instance behind.
            if let Err(e) = self.runner.run(stop, &dir.join("stop-before-start.log")) {
                log::debug!("pre-launch stop of {project} failed: {e}");
            }
        }

        log.step(2, format!("start {project} service (log={})...", log_path.display()));
        let launch = self.request(&self.config.launch, &dir);
        let session = ServiceSession::launch(&launch, &self.config.startup_markers, &log_path)?;

        let outcome = self.exercise(&session, &dir, log);
        let final_state = session.shutdown(self.runner, stop.as_ref(), self.config.shutdown_grace(), log);
        if matches!(outcome, Err(SmokeError::Service(ServiceError::StartupFailed { .. }))) {
            log.raw(format!("\n{project} service startup failed; see log {}", log_path.display()));
            log.dump_file(&log_path);
        }
        outcome?;
        if final_state == StartupState::Failed {
            return Err(ServiceError::OutputFailed { log: log_path }.into());
        }
        Ok(())
    }

    fn exercise(&self, session: &ServiceSession, dir: &Path, log: &mut VerificationLog<'_>) -> Result<()> {
        session.wait_for_startup(self.config.startup_timeout())?;
        log.step(3, "startup done");
        let functional = FunctionalCheck {
            runner: self.runner,
            source: self.source,
            config: &self.config.functional,
            env: &self.env,
        };
        functional.run(dir, log)
    }

    fn request(&self, spec: &CommandSpec, dir: &Path) -> CommandRequest {
        CommandRequest::from_spec(spec, dir).with_env(self.env.iter().cloned())
    }
}

#[cfg(all(test, unix))]
#[path = "service_tests.rs"]
mod tests;

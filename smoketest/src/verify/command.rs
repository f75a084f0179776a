//! External command boundary.
//!
//! Toolchain, gpg and service control commands are opaque to the smoke
//! tester: each runs with its combined output redirected to a log file and
//! reports only an exit status. A failing command has its log printed in full.

use crate::config::CommandSpec;
use crate::error::{Result, SmokeError};
use crate::output::VerificationLog;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// What to execute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    /// A command line interpreted by `sh -c`.
    Shell(String),
    /// A program with explicit arguments.
    Exec {
        /// Program path.
        program: PathBuf,
        /// Arguments.
        args: Vec<String>,
    },
}

/// A fully described external command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    /// What to execute.
    pub invocation: Invocation,
    /// Working directory.
    pub dir: Option<PathBuf>,
    /// Environment overrides.
    pub env: Vec<(String, String)>,
    /// Upper bound on run time; the process is killed when exceeded.
    pub timeout: Option<Duration>,
}

impl CommandRequest {
    /// A shell command line.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(Invocation::Shell(command.into()))
    }

    /// A program with arguments.
    pub fn exec<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Invocation::Exec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        })
    }

    /// Build a request from configuration, resolving its working directory
    /// and any relative program path against `root`.
    #[must_use]
    pub fn from_spec(spec: &CommandSpec, root: &Path) -> Self {
        match spec {
            CommandSpec::Shell { shell, dir } => {
                Self::shell(shell.clone()).in_dir(resolve_dir(root, dir.as_deref()))
            }
            CommandSpec::Exec { program, args, dir } => {
                let cwd = resolve_dir(root, dir.as_deref());
                let program = if program.contains('/') && Path::new(program).is_relative() {
                    cwd.join(program)
                } else {
                    PathBuf::from(program)
                };
                Self::exec(program, args.iter().cloned()).in_dir(cwd)
            }
        }
    }

    fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            dir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Add environment overrides.
    #[must_use]
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }

    /// Bound the run time.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human-readable command line.
    #[must_use]
    pub fn display(&self) -> String {
        match &self.invocation {
            Invocation::Shell(line) => line.clone(),
            Invocation::Exec { program, args } => std::iter::once(program.display().to_string())
                .chain(args.iter().cloned())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Build the [`Command`] for this request without redirections.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = match &self.invocation {
            Invocation::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(line);
                cmd
            }
            Invocation::Exec { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }
}

fn resolve_dir(root: &Path, dir: Option<&str>) -> PathBuf {
    dir.map_or_else(|| root.to_owned(), |d| root.join(d))
}

/// Abstraction for running external commands with logged output.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run `request` with stdout and stderr written to `log`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error spawning or waiting for the process, and
    /// [`std::io::ErrorKind::TimedOut`] if the request's timeout elapsed.
    fn run(&self, request: &CommandRequest, log: &Path) -> std::io::Result<ExitStatus>;
}

/// Runs commands on the host system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, request: &CommandRequest, log: &Path) -> std::io::Result<ExitStatus> {
        let out = File::create(log)?;
        let err = out.try_clone()?;
        let mut child = request
            .to_command()
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(err)
            .spawn()?;
        log::debug!("spawned \"{}\" (pid {})", request.display(), child.id());
        let Some(timeout) = request.timeout else {
            return child.wait();
        };
        match child.wait_timeout(timeout)? {
            Some(status) => Ok(status),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("\"{}\" timed out after {timeout:?}", request.display()),
                ))
            }
        }
    }
}

/// Run `request`, failing with its log printed if it exits unsuccessfully.
///
/// # Errors
///
/// Returns [`SmokeError::ExternalCommandFailure`] naming the command and log
/// file when the command cannot be run or exits non-zero.
pub fn run_logged(
    runner: &dyn CommandRunner,
    request: &CommandRequest,
    log: &Path,
    trail: &mut VerificationLog<'_>,
) -> Result<()> {
    let outcome = runner.run(request, log);
    let succeeded = match &outcome {
        Ok(status) => status.success(),
        Err(e) => {
            log::warn!("could not run \"{}\": {e}", request.display());
            false
        }
    };
    if succeeded {
        return Ok(());
    }
    trail.raw(format!("\ncommand \"{}\" failed:", request.display()));
    trail.dump_file(log);
    Err(SmokeError::ExternalCommandFailure {
        command: request.display(),
        log: std::path::absolute(log).unwrap_or_else(|_| log.to_owned()),
    })
}

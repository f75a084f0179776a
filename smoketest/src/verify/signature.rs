//! Detached signature verification with gpg.
//!
//! Each signature is verified twice: once against a throwaway key ring that
//! holds only the release's `KEYS` bundle, and once against the user's own
//! trust store. Warnings gpg prints are surfaced unless they are the ones
//! expected for that context.

use super::command::{CommandRequest, CommandRunner};
use crate::config::GpgConfig;
use crate::error::{Result, SmokeError};
use std::path::{Path, PathBuf};

/// A key ring seeded from one project's `KEYS` bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRing {
    /// Project the keys belong to.
    pub project: String,
    /// The downloaded key bundle.
    pub keys_file: PathBuf,
    /// gpg home directory holding only the imported keys.
    pub clean_home: PathBuf,
    /// Directory receiving gpg log files.
    pub log_dir: PathBuf,
}

impl KeyRing {
    /// Create a fresh gpg home under `tmp_dir` and import `keys_file` into it.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::ExternalCommandFailure`] if the import fails,
    /// [`SmokeError::CommandSpawn`] if gpg cannot be run and
    /// [`SmokeError::Io`] if the home directory cannot be created.
    pub fn prepare(
        runner: &dyn CommandRunner,
        gpg: &GpgConfig,
        tmp_dir: &Path,
        project: &str,
        keys_file: &Path,
    ) -> Result<Self> {
        let clean_home = tmp_dir.join(format!("{project}.gpg"));
        if clean_home.exists() {
            std::fs::remove_dir_all(&clean_home)?;
        }
        create_private_dir(&clean_home)?;
        let ring = Self {
            project: project.to_owned(),
            keys_file: keys_file.to_owned(),
            clean_home,
            log_dir: tmp_dir.to_owned(),
        };
        let request = CommandRequest::exec(
            &gpg.program,
            [
                "--homedir".to_owned(),
                ring.clean_home.display().to_string(),
                "--import".to_owned(),
                keys_file.display().to_string(),
            ],
        );
        run_checked(runner, &request, &ring.log(&format!("{project}.gpg.import.log")))?;
        Ok(ring)
    }

    fn log(&self, name: &str) -> PathBuf {
        self.log_dir.join(name)
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Verifies detached signatures.
#[cfg_attr(test, mockall::automock)]
pub trait SignatureVerifier {
    /// Verify `signature` over `artifact` in both trust contexts.
    ///
    /// Returns the unexpected warning lines gpg printed, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::SignatureInvalid`] if either verification exits
    /// unsuccessfully, or [`SmokeError::CommandSpawn`] if gpg cannot be run.
    fn verify(&self, ring: &KeyRing, artifact: &Path, signature: &Path) -> Result<Vec<String>>;
}

/// [`SignatureVerifier`] backed by the gpg command line.
pub struct GpgVerifier<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a GpgConfig,
    env: Vec<(String, String)>,
}

impl<'a> GpgVerifier<'a> {
    /// Create a verifier running gpg through `runner`.
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a GpgConfig,
        env: Vec<(String, String)>,
    ) -> Self {
        Self {
            runner,
            config,
            env,
        }
    }

    fn gpg<I: IntoIterator<Item = String>>(&self, args: I) -> CommandRequest {
        CommandRequest::exec(&self.config.program, args).with_env(self.env.clone())
    }

    fn verify_once(
        &self,
        home: Option<&Path>,
        artifact: &Path,
        signature: &Path,
        log: &Path,
    ) -> Result<()> {
        let mut args = Vec::new();
        if let Some(home) = home {
            args.extend(["--homedir".to_owned(), home.display().to_string()]);
        }
        args.extend([
            "--verify".to_owned(),
            signature.display().to_string(),
            artifact.display().to_string(),
        ]);
        let request = self.gpg(args);
        let status = self
            .runner
            .run(&request, log)
            .map_err(|source| SmokeError::CommandSpawn {
                command: request.display(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(SmokeError::SignatureInvalid {
                artifact: file_name(artifact),
                log: log.to_owned(),
            })
        }
    }
}

impl SignatureVerifier for GpgVerifier<'_> {
    fn verify(&self, ring: &KeyRing, artifact: &Path, signature: &Path) -> Result<Vec<String>> {
        let name = file_name(artifact);
        let project = &ring.project;

        let clean_log = ring.log(&format!("{project}.{name}.gpg.verify.log"));
        self.verify_once(Some(&ring.clean_home), artifact, signature, &clean_log)?;
        let mut clean_expected = vec![self.config.untrusted_key_warning.as_str()];
        clean_expected.extend(self.config.ignored_warnings.iter().map(String::as_str));
        let mut anomalies = unexpected_warnings(&read_log(&clean_log)?, &clean_expected);

        let import = self.gpg(["--import".to_owned(), ring.keys_file.display().to_string()]);
        run_checked(
            self.runner,
            &import,
            &ring.log(&format!("{project}.gpg.trust.import.log")),
        )?;
        let trust_log = ring.log(&format!("{project}.{name}.gpg.trust.log"));
        self.verify_once(None, artifact, signature, &trust_log)?;
        let trust_expected: Vec<_> = self.config.ignored_warnings.iter().map(String::as_str).collect();
        anomalies.extend(unexpected_warnings(&read_log(&trust_log)?, &trust_expected));
        Ok(anomalies)
    }
}

/// Lines mentioning a warning that contain none of the `expected` texts.
#[must_use]
pub fn unexpected_warnings(log: &str, expected: &[&str]) -> Vec<String> {
    log.lines()
        .filter(|line| line.to_lowercase().contains("warning"))
        .filter(|line| !expected.iter().any(|known| line.contains(known)))
        .map(|line| format!("GPG: {}", line.trim()))
        .collect()
}

fn run_checked(runner: &dyn CommandRunner, request: &CommandRequest, log: &Path) -> Result<()> {
    match runner.run(request, log) {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => Err(SmokeError::ExternalCommandFailure {
            command: request.display(),
            log: log.to_owned(),
        }),
        Err(source) => Err(SmokeError::CommandSpawn {
            command: request.display(),
            source,
        }),
    }
}

fn read_log(path: &Path) -> Result<String> {
    // Logs may be absent when a runner does not write one.
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;

//! A launched service process and the thread reading its output.

use super::ServiceError;
use super::signals::{StartupSignals, StartupState};
use crate::output::VerificationLog;
use crate::verify::{CommandRequest, CommandRunner};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// How often a bounded join checks the reader thread.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A running service and the reader thread tailing its output.
pub struct ServiceSession {
    child: Child,
    reader: Option<JoinHandle<()>>,
    signals: Arc<StartupSignals>,
    log: PathBuf,
}

impl ServiceSession {
    /// Spawn `request` with stdout and stderr merged into one pipe and start
    /// the reader thread, which copies output to `log` and signals readiness
    /// once a single line contains every one of `markers`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Launch`] if the log cannot be created or the
    /// process cannot be spawned.
    pub fn launch(request: &CommandRequest, markers: &[String], log: &Path) -> Result<Self, ServiceError> {
        let dir = request.dir.clone().unwrap_or_default();
        let launch_err = |source| ServiceError::Launch {
            dir: dir.clone(),
            source,
        };
        let log_file = File::create(log).map_err(launch_err)?;
        let (output, writer) = std::io::pipe().map_err(launch_err)?;
        let mut command = request.to_command();
        command
            .stdin(Stdio::piped())
            .stdout(writer.try_clone().map_err(launch_err)?)
            .stderr(writer);
        let child = command.spawn().map_err(launch_err)?;
        // Release the parent's copies of the write end so the reader sees EOF
        // when the service exits.
        drop(command);
        log::debug!("launched \"{}\" (pid {})", request.display(), child.id());

        let signals = Arc::new(StartupSignals::new());
        let reader = {
            let signals = Arc::clone(&signals);
            let markers = markers.to_vec();
            std::thread::spawn(move || read_output(output, log_file, &markers, &signals))
        };
        Ok(Self {
            child,
            reader: Some(reader),
            signals,
            log: log.to_owned(),
        })
    }

    /// Block until startup completes, fails, or `timeout` elapses.
    ///
    /// Only the reader thread publishes the startup state. A process that
    /// exits closes its end of the pipe, so the exit is seen as end of output
    /// after every line it printed has been read.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::StartupFailed`] if output ended first, and
    /// [`ServiceError::StartupTimeout`] if the bound was exceeded.
    pub fn wait_for_startup(&self, timeout: Duration) -> Result<(), ServiceError> {
        match self.signals.wait(timeout) {
            Some(StartupState::Ready) => Ok(()),
            Some(_) => Err(ServiceError::StartupFailed {
                log: self.log.clone(),
            }),
            None => Err(ServiceError::StartupTimeout {
                timeout_secs: timeout.as_secs(),
                log: self.log.clone(),
            }),
        }
    }

    /// Stop the service and reap the reader thread.
    ///
    /// Runs `stop` and waits `grace` for output to end; a service still
    /// running is killed and given another `grace`. A reader that outlives
    /// both is abandoned with a warning. Returns the final startup state so
    /// read failures after startup can be reported.
    pub fn shutdown(
        mut self,
        runner: &dyn CommandRunner,
        stop: Option<&CommandRequest>,
        grace: Duration,
        log: &mut VerificationLog<'_>,
    ) -> StartupState {
        if let Some(stop) = stop {
            log.step(2, format!("stop service using: {}", stop.display()));
            let stop_log = self.log.with_extension("stop.log");
            match runner.run(stop, &stop_log) {
                Ok(status) if !status.success() => log::debug!("stop command exited with {status}"),
                Ok(_) => {}
                Err(e) => log::warn!("could not run stop command: {e}"),
            }
        }
        let Some(reader) = self.reader.take() else {
            return self.signals.state();
        };
        let reader = match join_within(reader, grace) {
            Ok(()) => None,
            Err(reader) => {
                log.warn("service didn't respond to stop; killing it now...");
                if let Err(e) = self.child.kill() {
                    log::debug!("kill failed: {e}");
                }
                join_within(reader, grace).err()
            }
        };
        if let Some(reader) = reader {
            log.warn("service didn't respond to kill; ignoring...");
            // The thread is detached and the process may be leaked.
            drop(reader);
            return self.signals.state();
        }
        self.reap(grace);
        self.signals.state()
    }

    fn reap(&mut self, grace: Duration) {
        match self.child.wait_timeout(grace) {
            Ok(Some(status)) => log::debug!("service exited with {status}"),
            Ok(None) | Err(_) => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}

/// Join `handle` if it finishes within `grace`, or hand it back.
fn join_within(handle: JoinHandle<()>, grace: Duration) -> Result<(), JoinHandle<()>> {
    let deadline = Instant::now() + grace;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Err(handle);
        }
        std::thread::sleep(JOIN_POLL_INTERVAL);
    }
    if handle.join().is_err() {
        log::warn!("service output reader panicked");
    }
    Ok(())
}

fn read_output(output: impl Read, mut log_file: File, markers: &[String], signals: &StartupSignals) {
    let mut lines = BufReader::new(output);
    let mut line = Vec::new();
    loop {
        line.clear();
        match lines.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("failed to read service output: {e}");
                signals.fail();
                return;
            }
        }
        if let Err(e) = log_file.write_all(&line).and_then(|()| log_file.flush()) {
            log::warn!("failed to write service log: {e}");
            signals.fail();
            return;
        }
        if signals.state() == StartupState::Launching {
            let text = String::from_utf8_lossy(&line);
            if markers.iter().all(|marker| text.contains(marker.as_str())) {
                signals.ready();
            }
        }
    }
    signals.finish();
}

//! Console output for the smoke tester.
//!
//! Progress lines go to a caller-supplied writer so that tests can capture
//! them. Every line written through [`VerificationLog`] is also kept as an
//! ordered trail of the checks that ran.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Prefix of every non-fatal anomaly line.
pub const WARNING_PREFIX: &str = "***WARNING***";

/// Write a single line, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Ordered trail of check descriptions and warnings for one run.
pub struct VerificationLog<'a> {
    out: &'a mut dyn Write,
    quiet: bool,
    steps: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> VerificationLog<'a> {
    /// Create a trail that echoes to `out` unless `quiet` is set.
    pub fn new(out: &'a mut dyn Write, quiet: bool) -> Self {
        Self {
            out,
            quiet,
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record a check at nesting `depth` (two spaces per level).
    pub fn step(&mut self, depth: usize, message: impl Display) {
        let line = format!("{:width$}{message}", "", width = depth * 2);
        if !self.quiet {
            write_stderr_line(self.out, &line);
        }
        log::debug!("{}", line.trim_start());
        self.steps.push(line);
    }

    /// Record a non-fatal anomaly. Warnings are printed even when quiet.
    pub fn warn(&mut self, message: impl Display) {
        let line = format!("{WARNING_PREFIX}: {message}");
        write_stderr_line(self.out, &line);
        log::warn!("{message}");
        self.warnings.push(line);
    }

    /// Print the contents of a log file so a failure can be diagnosed.
    pub fn dump_file(&mut self, path: &Path) {
        write_stderr_line(self.out, format!("\n{}:", path.display()));
        match std::fs::read(path) {
            Ok(bytes) => write_stderr_line(self.out, String::from_utf8_lossy(&bytes).trim_end()),
            Err(e) => write_stderr_line(self.out, format!("  (unreadable: {e})")),
        }
    }

    /// Print a free-form line without recording it.
    pub fn raw(&mut self, message: impl Display) {
        write_stderr_line(self.out, message);
    }

    /// Checks recorded so far, in order.
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Warnings recorded so far, in order.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Format the final success banner.
///
/// # Examples
///
/// ```
/// use smoketest::output::success_banner;
/// use std::time::Duration;
///
/// assert_eq!(success_banner(Duration::from_millis(61_500)), "SUCCESS! [0:01:01.500000]");
/// ```
#[must_use]
pub fn success_banner(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "SUCCESS! [{}:{:02}:{:02}.{:06}]",
        total / 3600,
        (total / 60) % 60,
        total % 60,
        elapsed.subsec_micros()
    )
}

//! Toolchain commands run inside an unpacked distribution.
//!
//! The build tool is a black box: each configured command runs through the
//! external command boundary with its own log file. The demo round trip is
//! the one place the smoke tester reads a command's output, to confirm the
//! search found enough documents and the index checker saw the right version.

use crate::config::{DemoConfig, NoticeEmbedding, ToolchainStep, expand};
use crate::error::{Result, SmokeError};
use crate::output::VerificationLog;
use crate::release::{PackageKind, ReleaseVersion, strip_trailing_zeros};
use crate::verify::{CommandRequest, CommandRunner, run_logged};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static HITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) total matching documents").expect("matching documents regex is valid")
});

static INDEX_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s+version=(.*?)$").expect("index version regex is valid"));

/// Runs toolchain commands with a fixed environment.
pub struct Toolchain<'a> {
    runner: &'a dyn CommandRunner,
    env: Vec<(String, String)>,
}

impl<'a> Toolchain<'a> {
    /// Create a toolchain running commands through `runner` with `env`
    /// overrides.
    pub fn new(runner: &'a dyn CommandRunner, env: Vec<(String, String)>) -> Self {
        Self { runner, env }
    }

    /// Run each step inside `root`, logging to `root/{step.log}`.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::ExternalCommandFailure`] for the first failing
    /// step.
    pub fn run_steps(
        &self,
        root: &Path,
        steps: &[ToolchainStep],
        vars: &[(&str, &str)],
        log: &mut VerificationLog<'_>,
    ) -> Result<()> {
        for step in steps {
            log.step(2, &step.description);
            let dir = step.dir.as_deref().map_or_else(|| root.to_owned(), |d| root.join(d));
            let request = self.request(&expand(&step.command, vars), &dir);
            run_logged(self.runner, &request, &root.join(&step.log), log)?;
        }
        Ok(())
    }

    /// Index, search and check the demo index inside `root`.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::DemoFailure`] if the search reports too few hits
    /// or the index checker reports another version, and command failures as
    /// [`SmokeError::ExternalCommandFailure`].
    pub fn run_demo(
        &self,
        project: &str,
        root: &Path,
        demo: &DemoConfig,
        kind: PackageKind,
        version: &ReleaseVersion,
        log: &mut VerificationLog<'_>,
    ) -> Result<()> {
        let index = root.join("index");
        if index.exists() {
            std::fs::remove_dir_all(&index)?;
        }
        log.step(2, "test demo...");
        let (classpath, docs) = match kind {
            PackageKind::Binary => (&demo.binary_classpath, &demo.binary_docs),
            PackageKind::Source => (&demo.source_classpath, &demo.source_docs),
        };
        let classpath = expand(classpath, &[("version", version.as_str())]);
        let vars = [("classpath", classpath.as_str()), ("docs", docs.as_str())];

        self.run_in(root, &expand(&demo.index_command, &vars), "index.log", log)?;
        let search_log = self.run_in(root, &expand(&demo.search_command, &vars), "search.log", log)?;
        let hits = parse_hits(&std::fs::read_to_string(&search_log)?);
        let failure = |reason: String, log: &Path| SmokeError::DemoFailure {
            project: project.to_owned(),
            reason,
            log: log.to_owned(),
        };
        match hits {
            None => return Err(failure("SearchFiles found no results".to_owned(), &search_log)),
            Some(hits) if hits < demo.min_hits => {
                return Err(failure(
                    format!("SearchFiles found too few results: {hits} (expected at least {})", demo.min_hits),
                    &search_log,
                ));
            }
            Some(hits) => log.step(3, format!("got {hits} hits")),
        }

        log.step(2, "checkindex...");
        let check_log =
            self.run_in(root, &expand(&demo.check_index_command, &vars), "checkindex.log", log)?;
        let reported = parse_index_version(&std::fs::read_to_string(&check_log)?)
            .ok_or_else(|| failure("unable to locate version=NNN output from CheckIndex".to_owned(), &check_log))?;
        if strip_trailing_zeros(&reported) != version.without_trailing_zeros() {
            return Err(failure(
                format!("wrong version from CheckIndex: got \"{reported}\" but expected \"{version}\""),
                &check_log,
            ));
        }
        Ok(())
    }

    fn run_in(
        &self,
        root: &Path,
        command: &str,
        log_name: &str,
        log: &mut VerificationLog<'_>,
    ) -> Result<PathBuf> {
        let log_path = root.join(log_name);
        run_logged(self.runner, &self.request(command, root), &log_path, log)?;
        Ok(log_path)
    }

    fn request(&self, command: &str, dir: &Path) -> CommandRequest {
        CommandRequest::shell(command)
            .in_dir(dir)
            .with_env(self.env.iter().cloned())
    }
}

/// Number of hits reported by a demo search log.
#[must_use]
pub fn parse_hits(text: &str) -> Option<u64> {
    HITS_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Index version reported by an index checker log.
#[must_use]
pub fn parse_index_version(text: &str) -> Option<String> {
    INDEX_VERSION_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('\r').to_owned())
}

/// Check that `project`'s source notice embeds its dependency's notice
/// verbatim between the configured header and footer.
///
/// # Errors
///
/// Returns [`SmokeError::NoticeNotEmbedded`] if the wrapped notice is absent.
pub fn check_notice_embedding(project: &str, root: &Path, embedding: &NoticeEmbedding) -> Result<()> {
    let notice = std::fs::read_to_string(root.join("NOTICE.txt"))?;
    let embedded = std::fs::read_to_string(root.join(&embedding.path))?;
    let expected = format!("{}{embedded}{}", embedding.header, embedding.footer);
    if notice.contains(&expected) {
        Ok(())
    } else {
        Err(SmokeError::NoticeNotEmbedded {
            project: project.to_owned(),
            of: embedding.of.clone(),
        })
    }
}

#[cfg(test)]
#[path = "toolchain_tests.rs"]
mod tests;

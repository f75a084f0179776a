//! Release smoke tester CLI entrypoint.
//!
//! This binary wires the production collaborators (HTTP/filesystem source,
//! system command runner, gpg) into the verification pipeline and turns its
//! outcome into an exit status.

use camino::Utf8Path;
use clap::Parser;
use smoketest::cli::Cli;
use smoketest::config::SmokeConfig;
use smoketest::error::Result;
use smoketest::fetch::HttpSource;
use smoketest::output::{VerificationLog, success_banner, write_stderr_line};
use smoketest::pipeline::{Collaborators, Pipeline};
use smoketest::release::check_project_names;
use smoketest::verify::{GpgVerifier, SystemRunner};
use std::io::Write;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Route `log` records and diagnostics to stderr. `--log-level` wins over
/// `RUST_LOG`; anything unparsable falls back to `warn`.
fn init_logging(level: Option<&str>) {
    tracing_subscriber::registry()
        .with(log_filter(level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn log_filter(level: Option<&str>) -> EnvFilter {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    };
    filter.unwrap_or_else(|| EnvFilter::new("warn"))
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let started = Instant::now();
    let config = SmokeConfig::load(cli.config.as_deref().map(Utf8Path::as_std_path))?;
    check_project_names(&config)?;
    let context = cli.release_context(&config)?;

    if !cli.quiet {
        write_stderr_line(
            stderr,
            format!(
                "Test release {} (revision {}) in {}",
                context.version,
                context.revision.label(),
                context.tmp_dir.display()
            ),
        );
    }

    let runner = SystemRunner;
    let verifier = GpgVerifier::new(&runner, &config.gpg, context.command_env());
    let collaborators = Collaborators {
        source: &HttpSource,
        runner: &runner,
        verifier: &verifier,
    };
    let pipeline = Pipeline::new(&config, context, collaborators, cli.cache_policy())?;
    let mut log = VerificationLog::new(&mut *stderr, cli.quiet);
    pipeline.run(&mut log)?;
    let warnings = log.warnings().len();
    drop(log);

    if warnings > 0 {
        write_stderr_line(stderr, format!("\n{warnings} warning(s) reported above"));
    }
    write_stderr_line(stderr, format!("\n{}", success_banner(started.elapsed())));
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("\n{err}"));
            1
        }
    }
}

//! Tests for toolchain commands, the demo check and notice embedding.

use super::*;
use crate::config::SmokeConfig;
use crate::test_utils::{exit_status, write_file};
use crate::verify::command::MockCommandRunner;
use rstest::{fixture, rstest};
use std::sync::{Arc, Mutex};

#[fixture]
fn config() -> SmokeConfig {
    SmokeConfig::bundled().expect("bundled configuration")
}

fn version() -> ReleaseVersion {
    ReleaseVersion::parse("5.1.0").expect("version")
}

/// A runner that writes canned output into each log, keyed by a command
/// substring, and records every request.
fn scripted_runner(
    outputs: &[(&'static str, &'static str)],
) -> (MockCommandRunner, Arc<Mutex<Vec<CommandRequest>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let outputs = outputs.to_vec();
    let mut runner = MockCommandRunner::new();
    runner.expect_run().returning(move |request, log| {
        recorded.lock().expect("lock").push(request.clone());
        let line = request.display();
        let text = outputs
            .iter()
            .find(|(key, _)| line.contains(key))
            .map_or("", |(_, text)| text);
        std::fs::write(log, text)?;
        Ok(exit_status(0))
    });
    (runner, seen)
}

fn quiet_log(buf: &mut Vec<u8>) -> VerificationLog<'_> {
    VerificationLog::new(buf, true)
}

#[rstest]
fn steps_expand_arguments_and_honour_dirs(config: SmokeConfig) {
    let solr = config.project("solr").expect("solr");
    let root = tempfile::tempdir().expect("tempdir");
    let (runner, seen) = scripted_runner(&[]);
    let toolchain = Toolchain::new(&runner, vec![("JAVA_HOME".to_owned(), "/jdk".to_owned())]);

    let mut buf = Vec::new();
    let mut log = quiet_log(&mut buf);
    toolchain
        .run_steps(root.path(), &solr.source_commands, &[("test_args", "-Dtests.nightly=false")], &mut log)
        .expect("steps succeed");
    drop(log);

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].dir.as_deref(), Some(root.path()));
    assert_eq!(seen[1].display(), "ant clean test -Dtests.slow=false -Dtests.nightly=false");
    assert_eq!(seen[1].dir, Some(root.path().join("solr")));
    assert!(seen[1].env.contains(&("JAVA_HOME".to_owned(), "/jdk".to_owned())));
    assert!(root.path().join("test.log").is_file());
}

#[rstest]
fn failing_step_stops_the_run(config: SmokeConfig) {
    let lucene = config.project("lucene").expect("lucene");
    let root = tempfile::tempdir().expect("tempdir");
    let mut runner = MockCommandRunner::new();
    runner.expect_run().times(1).returning(|_, log| {
        std::fs::write(log, "BUILD FAILED")?;
        Ok(exit_status(1))
    });
    let toolchain = Toolchain::new(&runner, Vec::new());

    let mut buf = Vec::new();
    let mut log = quiet_log(&mut buf);
    let err = toolchain
        .run_steps(root.path(), &lucene.source_commands, &[], &mut log)
        .expect_err("validate fails");
    assert!(matches!(err, SmokeError::ExternalCommandFailure { ref command, .. } if command == "ant validate"));
}

#[rstest]
#[case::enough_hits("156 total matching documents", "  version=5.1\n", None)]
#[case::too_few("12 total matching documents", "  version=5.1.0\n", Some("too few results: 12"))]
#[case::no_results("nothing", "  version=5.1.0\n", Some("no results"))]
#[case::wrong_version("156 total matching documents", "  version=5.0.0\n", Some("got \"5.0.0\""))]
#[case::no_version("156 total matching documents", "No problems were detected", Some("unable to locate"))]
fn demo_output_is_validated(
    config: SmokeConfig,
    #[case] search: &'static str,
    #[case] check_index: &'static str,
    #[case] failure: Option<&str>,
) {
    let demo = config
        .project("lucene")
        .and_then(|p| p.demo.as_ref())
        .expect("lucene demo");
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(root.path().join("index")).expect("stale index");
    let (runner, seen) = scripted_runner(&[("SearchFiles", search), ("CheckIndex", check_index)]);
    let toolchain = Toolchain::new(&runner, Vec::new());

    let mut buf = Vec::new();
    let mut log = quiet_log(&mut buf);
    let result = toolchain.run_demo("lucene", root.path(), demo, PackageKind::Binary, &version(), &mut log);
    drop(log);

    match failure {
        None => result.expect("demo passes"),
        Some(text) => {
            let err = result.expect_err("demo fails");
            assert!(matches!(err, SmokeError::DemoFailure { .. }));
            assert!(err.to_string().contains(text), "{err}");
        }
    }
    let seen = seen.lock().expect("lock");
    assert!(seen[0].display().contains("core/lucene-core-5.1.0.jar"));
    assert!(seen[0].display().ends_with("-docs docs"));
    assert!(!root.path().join("index").exists());
}

#[rstest]
fn source_demo_uses_build_classes(config: SmokeConfig) {
    let demo = config
        .project("lucene")
        .and_then(|p| p.demo.as_ref())
        .expect("lucene demo");
    let root = tempfile::tempdir().expect("tempdir");
    let (runner, seen) = scripted_runner(&[
        ("SearchFiles", "200 total matching documents"),
        ("CheckIndex", "    version=5.1.0"),
    ]);
    let toolchain = Toolchain::new(&runner, Vec::new());

    let mut buf = Vec::new();
    let mut log = quiet_log(&mut buf);
    toolchain
        .run_demo("lucene", root.path(), demo, PackageKind::Source, &version(), &mut log)
        .expect("demo passes");
    drop(log);

    let first = seen.lock().expect("lock")[0].display();
    assert!(first.contains("build/core/classes/java"), "{first}");
    assert!(first.ends_with("-docs core/src"), "{first}");
}

#[rstest]
#[case("Searching for: lucene\n1234 total matching documents\n", Some(1234))]
#[case("no hits", None)]
fn parses_hit_count(#[case] text: &str, #[case] expected: Option<u64>) {
    assert_eq!(parse_hits(text), expected);
}

#[rstest]
#[case("Segments file=segments_1\n    version=5.1.0\n", Some("5.1.0"))]
#[case("version=5.1.0 at line start without indent\n", None)]
fn parses_index_version(#[case] text: &str, #[case] expected: Option<&str>) {
    assert_eq!(parse_index_version(text).as_deref(), expected);
}

#[rstest]
fn notice_must_embed_dependency_notice(config: SmokeConfig) {
    let embedding = config
        .project("solr")
        .and_then(|p| p.notice_embedding.as_ref())
        .expect("solr embeds the lucene notice");
    let root = tempfile::tempdir().expect("tempdir");
    let lucene_notice = "Apache Lucene\nCopyright 2001-2015\n";
    write_file(root.path(), "lucene/NOTICE.txt", lucene_notice);
    write_file(
        root.path(),
        "NOTICE.txt",
        &format!("Apache Solr\n{}{lucene_notice}{}", embedding.header, embedding.footer),
    );
    check_notice_embedding("solr", root.path(), embedding).expect("verbatim copy");

    write_file(root.path(), "NOTICE.txt", &format!("Apache Solr\n{lucene_notice}"));
    let err = check_notice_embedding("solr", root.path(), embedding).expect_err("header missing");
    assert!(err.to_string().contains("solr's NOTICE.txt"), "{err}");
}

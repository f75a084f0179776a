//! Tests for CLI parsing and the run parameters derived from it.

use super::*;
use rstest::{fixture, rstest};

const RC_URL: &str =
    "http://people.apache.org/~whoever/staging_area/lucene-solr-5.1.0-RC1-rev1672403";

#[fixture]
fn config() -> SmokeConfig {
    SmokeConfig::bundled().expect("bundled configuration")
}

#[test]
fn cli_parses_defaults() {
    let cli = Cli::parse_from(["release-smoketest", RC_URL]);
    assert_eq!(cli.url, RC_URL);
    assert!(cli.tmp_dir.is_none());
    assert!(!cli.not_signed);
    assert!(cli.revision.is_none());
    assert!(cli.version.is_none());
    assert!(cli.config.is_none());
    assert!(!cli.reuse_cache);
    assert!(!cli.quiet);
    assert!(cli.test_args.is_empty());
    assert_eq!(cli.cache_policy(), CachePolicy::ForceClean);
}

#[test]
fn cli_requires_a_url() {
    assert!(Cli::try_parse_from(["release-smoketest"]).is_err());
}

#[test]
fn trailing_arguments_are_test_args() {
    let cli = Cli::parse_from([
        "release-smoketest",
        "--not-signed",
        RC_URL,
        "-Dtests.slow=false",
        "-Dtests.jvms=2",
    ]);
    assert!(cli.not_signed);
    assert_eq!(cli.test_args, vec!["-Dtests.slow=false", "-Dtests.jvms=2"]);
}

#[test]
fn version_flag_names_the_release_version() {
    let cli = Cli::parse_from(["release-smoketest", "--version", "6.0.0-BETA", RC_URL]);
    assert_eq!(cli.release_version().expect("explicit version").as_str(), "6.0.0-BETA");
}

#[rstest]
#[case::from_url(None, "5.1.0")]
#[case::explicit(Some("5.2.1"), "5.2.1")]
fn release_version_defaults_to_url(#[case] explicit: Option<&str>, #[case] expected: &str) {
    let cli = Cli {
        url: RC_URL.to_owned(),
        version: explicit.map(str::to_owned),
        ..Cli::default()
    };
    assert_eq!(cli.release_version().expect("version").as_str(), expected);
}

#[rstest]
#[case::malformed("5.1")]
#[case::suffix("5.1.0-RC1")]
fn malformed_explicit_version_is_rejected(#[case] version: &str) {
    let cli = Cli {
        url: RC_URL.to_owned(),
        version: Some(version.to_owned()),
        ..Cli::default()
    };
    let err = cli.release_version().expect_err("malformed version");
    assert!(err.to_string().contains("does not match"), "{err}");
}

#[test]
fn url_without_version_needs_an_explicit_one() {
    let cli = Cli {
        url: "file:///tmp/release".to_owned(),
        ..Cli::default()
    };
    assert!(matches!(cli.release_version(), Err(SmokeError::Precondition { .. })));
}

#[rstest]
#[case::from_url(None, Some("1672403"))]
#[case::explicit(Some("1672999"), Some("1672999"))]
fn revision_defaults_to_url(#[case] explicit: Option<&str>, #[case] expected: Option<&str>) {
    let cli = Cli {
        url: RC_URL.to_owned(),
        revision: explicit.map(str::to_owned),
        ..Cli::default()
    };
    assert_eq!(cli.revision().as_deref(), expected);
}

#[rstest]
fn release_context_collects_run_parameters(config: SmokeConfig) {
    let cli = Cli::parse_from([
        "release-smoketest",
        "--not-signed",
        "--tmp-dir",
        "/tmp/smoke-under-test",
        "--runtime-home",
        "/usr/lib/jvm/java-8",
        RC_URL,
        "-Dtests.slow=false",
    ]);
    let context = cli.release_context(&config).expect("context");

    assert_eq!(context.base_url, RC_URL);
    assert_eq!(context.version.as_str(), "5.1.0");
    assert_eq!(context.revision, RevisionCheck::Stamp("1672403".to_owned()));
    assert!(!context.signed);
    assert_eq!(context.tmp_dir, PathBuf::from("/tmp/smoke-under-test"));
    assert_eq!(context.test_args, "-Dtests.slow=false");
    assert_eq!(context.runtime_home, Some(PathBuf::from("/usr/lib/jvm/java-8")));
}

#[rstest]
fn missing_revision_is_refused_when_required(config: SmokeConfig) {
    let cli = Cli::parse_from(["release-smoketest", "file:///tmp/lucene-solr-5.1.0"]);
    let err = cli.release_context(&config).expect_err("no revision");
    assert!(err.to_string().contains("--revision"), "{err}");
}

#[rstest]
fn skip_revision_disables_the_stamp_check(config: SmokeConfig) {
    let cli = Cli::parse_from([
        "release-smoketest",
        "--revision",
        "skip",
        "--tmp-dir",
        "/tmp/smoke-skip",
        "file:///tmp/lucene-solr-5.1.0",
    ]);
    let context = cli.release_context(&config).expect("context");
    assert_eq!(context.revision, RevisionCheck::Skip);
}

#[test]
fn default_scratch_dir_is_named_after_version_and_revision() {
    let cli = Cli::default();
    let version = ReleaseVersion::parse("5.1.0").expect("version");
    let dir = cli
        .scratch_dir(&version, &RevisionCheck::Stamp("1672403".to_owned()))
        .expect("scratch dir");

    assert!(dir.starts_with(std::env::temp_dir()));
    let name = dir.file_name().and_then(|n| n.to_str()).expect("utf-8 name");
    assert!(name.starts_with("smoke_lucene_5.1.0_1672403"), "{name}");
}

#[test]
fn relative_tmp_dir_is_made_absolute() {
    let cli = Cli {
        tmp_dir: Some(Utf8PathBuf::from("smoke")),
        ..Cli::default()
    };
    let version = ReleaseVersion::parse("5.1.0").expect("version");
    let dir = cli.scratch_dir(&version, &RevisionCheck::Skip).expect("scratch dir");
    assert!(dir.is_absolute());
    assert!(dir.ends_with("smoke"));
}

#[test]
fn reuse_cache_selects_reuse_policy() {
    let cli = Cli::parse_from(["release-smoketest", "--reuse-cache", RC_URL]);
    assert_eq!(cli.cache_policy(), CachePolicy::Reuse);
}

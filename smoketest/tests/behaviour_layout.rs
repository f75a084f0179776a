//! Behaviour-driven tests for unpacked distribution layouts.
//!
//! Trees are built from the bundled Lucene layout manifest so the scenarios
//! track the release line's real rules.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use smoketest::config::{ProjectConfig, SmokeConfig};
use smoketest::error::SmokeError;
use smoketest::inspect::layout::required_entries;
use smoketest::inspect::{verify_layout, verify_no_packages};
use smoketest::release::PackageKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct LayoutWorld {
    config: SmokeConfig,
    dir: Option<TempDir>,
    kind: PackageKind,
    result: Option<Result<(), SmokeError>>,
}

impl Default for LayoutWorld {
    fn default() -> Self {
        Self {
            config: SmokeConfig::bundled().expect("bundled configuration"),
            dir: None,
            kind: PackageKind::Binary,
            result: None,
        }
    }
}

#[fixture]
fn world() -> LayoutWorld {
    LayoutWorld::default()
}

impl LayoutWorld {
    fn lucene(&self) -> &ProjectConfig {
        self.config.project("lucene").expect("lucene is configured")
    }

    fn root(&self) -> PathBuf {
        self.dir.as_ref().expect("tree unpacked").path().join("lucene-5.1.0")
    }

    fn unpack(&mut self, kind: PackageKind) {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("lucene-5.1.0");
        for entry in required_entries(&self.lucene().layout, kind) {
            create_entry(&root, &entry);
        }
        self.kind = kind;
        self.dir = Some(dir);
    }

    fn rejection(&self) -> String {
        match self.result.as_ref().expect("layout verified") {
            Ok(()) => panic!("expected the layout to be rejected"),
            Err(err) => {
                assert!(matches!(err, SmokeError::LayoutMismatch { .. }), "{err}");
                err.to_string()
            }
        }
    }
}

/// Entries with an extension are files, everything else a directory.
fn create_entry(root: &Path, entry: &str) {
    let path = root.join(entry);
    if Path::new(entry).extension().is_some() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(&path, "x").expect("write");
    } else {
        std::fs::create_dir_all(&path).expect("mkdir");
    }
}

#[given("an unpacked lucene binary distribution")]
fn given_binary(world: &mut LayoutWorld) {
    world.unpack(PackageKind::Binary);
}

#[given("an unpacked lucene source distribution")]
fn given_source(world: &mut LayoutWorld) {
    world.unpack(PackageKind::Source);
}

#[given("its \"{entry}\" entry is removed")]
fn given_entry_removed(world: &mut LayoutWorld, entry: String) {
    std::fs::remove_file(world.root().join(entry)).expect("remove entry");
}

#[given("an extra \"{entry}\" entry")]
fn given_extra_entry(world: &mut LayoutWorld, entry: String) {
    create_entry(&world.root(), &entry);
}

#[given("a packaged binary \"{path}\"")]
fn given_packaged_binary(world: &mut LayoutWorld, path: String) {
    create_entry(&world.root(), &path);
}

#[when("its layout is verified")]
fn when_layout_verified(world: &mut LayoutWorld) {
    let root = world.root();
    let artifact = match world.kind {
        PackageKind::Binary => "lucene-5.1.0.tgz",
        PackageKind::Source => "lucene-5.1.0-src.tgz",
    };
    let mut result = verify_layout(&root, "lucene", artifact, &world.lucene().layout, world.kind);
    if result.is_ok() && world.kind == PackageKind::Source {
        result = verify_no_packages(&root, "lucene", artifact, &world.config.package);
    }
    world.result = Some(result);
}

#[then("the layout is accepted")]
fn then_accepted(world: &mut LayoutWorld) {
    if let Some(Err(err)) = &world.result {
        panic!("layout rejected: {err}");
    }
    assert!(world.result.is_some());
}

#[then("the layout is rejected because \"{entry}\" is missing")]
fn then_missing(world: &mut LayoutWorld, entry: String) {
    let message = world.rejection();
    assert!(message.contains(&format!("\"{entry}\" is missing")), "{message}");
}

#[then("the layout is rejected listing \"{entry}\" as unexpected")]
fn then_unexpected(world: &mut LayoutWorld, entry: String) {
    let message = world.rejection();
    assert!(message.contains("unexpected files/dirs"), "{message}");
    assert!(message.contains(&entry), "{message}");
}

#[then("the layout is rejected because it contains packaged binaries")]
fn then_packaged_binaries(world: &mut LayoutWorld) {
    let message = world.rejection();
    assert!(message.contains("source release contains packaged binaries"), "{message}");
    assert!(message.contains("lucene-core-5.1.0.jar"), "{message}");
}

#[scenario(path = "tests/features/layout.feature", name = "Conforming binary distribution")]
fn scenario_conforming_binary(world: LayoutWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/layout.feature",
    name = "Binary distribution missing a required entry"
)]
fn scenario_missing_entry(world: LayoutWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/layout.feature",
    name = "Binary distribution with an unexpected entry"
)]
fn scenario_unexpected_entry(world: LayoutWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/layout.feature",
    name = "Source distribution with an allow-listed extra"
)]
fn scenario_allow_listed_extra(world: LayoutWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/layout.feature",
    name = "Source distribution with a packaged binary"
)]
fn scenario_packaged_binary(world: LayoutWorld) {
    let _ = world;
}

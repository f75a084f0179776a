//! Layout manifest checks for unpacked distributions.

use crate::config::{LayoutConfig, PackageRules};
use crate::error::{Result, SmokeError};
use crate::release::PackageKind;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Required top-level entries of a `kind` package, text files first.
#[must_use]
pub fn required_entries(layout: &LayoutConfig, kind: PackageKind) -> Vec<String> {
    let extra_text = match kind {
        PackageKind::Binary => &layout.binary_text_files,
        PackageKind::Source => &layout.source_text_files,
    };
    let entries = match kind {
        PackageKind::Binary => &layout.binary_entries,
        PackageKind::Source => &layout.source_entries,
    };
    layout
        .text_files
        .iter()
        .chain(extra_text)
        .map(|name| format!("{name}.txt"))
        .chain(entries.iter().cloned())
        .collect()
}

/// Diff the immediate children of `root` against the layout manifest.
///
/// Every required entry must exist. Binary packages may contain nothing
/// else; source packages may additionally carry entries from the source
/// allow-list.
///
/// # Errors
///
/// Returns [`SmokeError::LayoutMismatch`] naming the first missing entry or
/// every unexpected one.
pub fn verify_layout(
    root: &Path,
    project: &str,
    artifact: &str,
    layout: &LayoutConfig,
    kind: PackageKind,
) -> Result<()> {
    let mut remaining = BTreeSet::new();
    for entry in std::fs::read_dir(root)? {
        remaining.insert(entry?.file_name().to_string_lossy().into_owned());
    }
    let mismatch = |reason: String| SmokeError::LayoutMismatch {
        project: project.to_owned(),
        artifact: artifact.to_owned(),
        reason,
    };
    for required in required_entries(layout, kind) {
        if !remaining.remove(&required) {
            return Err(mismatch(format!("\"{required}\" is missing")));
        }
    }
    if kind == PackageKind::Source {
        for allowed in &layout.source_allow_list {
            remaining.remove(allowed);
        }
    }
    if !remaining.is_empty() {
        let unexpected: Vec<_> = remaining.into_iter().collect();
        return Err(mismatch(format!("unexpected files/dirs {unexpected:?}")));
    }
    Ok(())
}

/// Every packaged binary anywhere below `root`, in sorted order.
///
/// # Errors
///
/// Returns an I/O error if the tree cannot be walked.
pub fn find_packages(root: &Path, rules: &PackageRules) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_owned()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if rules.is_package(&entry.file_name().to_string_lossy()) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Fail if a source distribution embeds any packaged binary.
///
/// # Errors
///
/// Returns [`SmokeError::LayoutMismatch`] listing every packaged binary found.
pub fn verify_no_packages(
    root: &Path,
    project: &str,
    artifact: &str,
    rules: &PackageRules,
) -> Result<()> {
    let packages = find_packages(root, rules)?;
    if packages.is_empty() {
        return Ok(());
    }
    let listed: Vec<_> = packages
        .iter()
        .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
        .collect();
    Err(SmokeError::LayoutMismatch {
        project: project.to_owned(),
        artifact: artifact.to_owned(),
        reason: format!("source release contains packaged binaries {listed:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmokeConfig;
    use crate::test_utils::write_file;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> SmokeConfig {
        SmokeConfig::bundled().expect("bundled configuration")
    }

    fn conforming_tree(layout: &LayoutConfig, kind: PackageKind) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for entry in required_entries(layout, kind) {
            let path = dir.path().join(&entry);
            if std::path::Path::new(&entry).extension().is_some() {
                std::fs::write(path, "x").expect("write");
            } else {
                std::fs::create_dir(path).expect("mkdir");
            }
        }
        dir
    }

    #[rstest]
    #[case::lucene_binary("lucene", PackageKind::Binary)]
    #[case::lucene_source("lucene", PackageKind::Source)]
    #[case::solr_binary("solr", PackageKind::Binary)]
    #[case::solr_source("solr", PackageKind::Source)]
    fn conforming_tree_passes_and_removal_fails(
        config: SmokeConfig,
        #[case] project: &str,
        #[case] kind: PackageKind,
    ) {
        let layout = &config.project(project).expect("project").layout;
        let tree = conforming_tree(layout, kind);
        verify_layout(tree.path(), project, "artifact", layout, kind).expect("conforming");

        for entry in required_entries(layout, kind) {
            let path = tree.path().join(&entry);
            let hidden = tree.path().join(".hidden");
            std::fs::rename(&path, &hidden).expect("hide entry");
            let err = verify_layout(tree.path(), project, "artifact", layout, kind)
                .expect_err("missing entry must fail");
            assert!(err.to_string().contains(&entry), "{err}");
            std::fs::rename(&hidden, &path).expect("restore entry");
        }
    }

    #[rstest]
    fn binary_rejects_unexpected_entry(config: SmokeConfig) {
        let layout = &config.project("lucene").expect("lucene").layout;
        let tree = conforming_tree(layout, PackageKind::Binary);
        std::fs::create_dir(tree.path().join("spatial3d")).expect("mkdir");

        let err = verify_layout(tree.path(), "lucene", "lucene-5.1.0.tgz", layout, PackageKind::Binary)
            .expect_err("extra module");
        assert!(err.to_string().contains("spatial3d"));
    }

    #[rstest]
    fn source_tolerates_allow_listed_entries_only(config: SmokeConfig) {
        let layout = &config.project("lucene").expect("lucene").layout;
        let tree = conforming_tree(layout, PackageKind::Source);
        std::fs::create_dir(tree.path().join("spatial3d")).expect("mkdir");
        verify_layout(tree.path(), "lucene", "src", layout, PackageKind::Source).expect("allowed");

        std::fs::create_dir(tree.path().join("nightly")).expect("mkdir");
        assert!(verify_layout(tree.path(), "lucene", "src", layout, PackageKind::Source).is_err());
    }

    #[rstest]
    fn source_with_nested_jar_is_rejected(config: SmokeConfig) {
        let tree = tempfile::tempdir().expect("tempdir");
        write_file(tree.path(), "core/src/java/Foo.java", "class Foo {}");
        verify_no_packages(tree.path(), "lucene", "src", &config.package).expect("clean");

        write_file(tree.path(), "tools/lib/ant-contrib.jar", "");
        let err = verify_no_packages(tree.path(), "lucene", "src", &config.package)
            .expect_err("embedded jar");
        assert!(err.to_string().contains("tools/lib/ant-contrib.jar"), "{err}");
    }
}

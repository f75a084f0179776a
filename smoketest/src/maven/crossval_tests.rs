//! Tests for Maven repository cross-validation.

use super::*;
use crate::test_utils::{write_file, zip_bytes};
use crate::verify::digest::compute_digests;
use crate::verify::signature::MockSignatureVerifier;
use rstest::{fixture, rstest};

const VERSION: &str = "5.1.0";
const ALGORITHMS: [DigestAlgorithm; 2] = [DigestAlgorithm::Md5, DigestAlgorithm::Sha1];

/// A scratch `maven/` root holding one deployed Lucene module.
struct Repository {
    dir: tempfile::TempDir,
}

impl Repository {
    fn root(&self) -> PathBuf {
        self.dir.path().join("maven")
    }

    fn module_dir(&self, artifact_id: &str) -> PathBuf {
        self.root()
            .join("org/apache/lucene")
            .join(artifact_id)
            .join(VERSION)
    }

    fn path(&self, artifact_id: &str, suffix: &str) -> PathBuf {
        self.module_dir(artifact_id)
            .join(format!("{artifact_id}-{VERSION}{suffix}"))
    }

    /// Deploy a module with its POM, javadoc/sources jars, digests and
    /// signatures.
    fn deploy(&self, artifact_id: &str, packaging: &str) {
        let dir = self.module_dir(artifact_id);
        std::fs::create_dir_all(&dir).expect("module dir");
        let binary = zip_bytes(&[("META-INF/MANIFEST.MF", format!("{artifact_id}\n").as_bytes())]);
        std::fs::write(self.path(artifact_id, &format!(".{packaging}")), binary).expect("binary");
        std::fs::write(self.path(artifact_id, ".pom"), pom(artifact_id, VERSION, packaging)).expect("pom");
        let mut deployed = vec![format!(".{packaging}"), ".pom".to_owned()];
        if packaging == "jar" {
            for kind in ["javadoc", "sources"] {
                std::fs::write(self.path(artifact_id, &format!("-{kind}.jar")), kind).expect("companion jar");
                deployed.push(format!("-{kind}.jar"));
            }
        }
        for suffix in &deployed {
            let file = self.path(artifact_id, suffix);
            let digests = compute_digests(&file, &ALGORITHMS).expect("digests");
            for (algorithm, hex) in ALGORITHMS.iter().zip(digests) {
                std::fs::write(companion(&file, algorithm.suffix()), format!("{hex}\n")).expect("digest");
            }
            std::fs::write(companion(&file, "asc"), "signature").expect("signature");
        }
    }

    fn artifacts(&self) -> Vec<MavenArtifacts> {
        let mut files = Vec::new();
        let mut pending = vec![self.root()];
        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir).expect("read dir") {
                let path = entry.expect("entry").path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        vec![MavenArtifacts::new("lucene", files)]
    }
}

fn pom(artifact_id: &str, version: &str, packaging: &str) -> String {
    format!(
        r#"<project xmlns="http://maven.apache.org/POM/4.0.0">
  <groupId>org.apache.lucene</groupId>
  <artifactId>{artifact_id}</artifactId>
  <version>{version}</version>
  <packaging>{packaging}</packaging>
</project>"#
    )
}

#[fixture]
fn repository() -> Repository {
    let repository = Repository {
        dir: tempfile::tempdir().expect("tempdir"),
    };
    repository.deploy("lucene-core", "jar");
    repository
}

#[rstest]
fn complete_repository_passes(repository: Repository) {
    let artifacts = repository.artifacts();
    check_pom_per_binary(&artifacts, VERSION).expect("poms");
    check_javadoc_and_sources(&artifacts, VERSION).expect("companions");
    check_deployed_coordinates(&artifacts, VERSION).expect("coordinates");
    check_digests(&artifacts, &ALGORITHMS).expect("digests");
}

#[rstest]
fn binary_without_pom_is_rejected(repository: Repository) {
    std::fs::remove_file(repository.path("lucene-core", ".pom")).expect("remove pom");
    let err = check_pom_per_binary(&repository.artifacts(), VERSION).expect_err("missing pom");
    assert!(matches!(err, CoordinateError::MissingPom { ref artifact } if artifact.ends_with("lucene-core-5.1.0.jar")));
}

#[rstest]
fn jar_without_sources_is_rejected(repository: Repository) {
    std::fs::remove_file(repository.path("lucene-core", "-sources.jar")).expect("remove sources");
    let err = check_javadoc_and_sources(&repository.artifacts(), VERSION).expect_err("missing sources");
    assert!(err.to_string().contains("lucene-core-5.1.0-sources.jar"), "{err}");
}

#[rstest]
#[case::wrong_artifact_id(pom("lucene-misc", VERSION, "jar"))]
#[case::wrong_version(pom("lucene-core", "5.0.0", "jar"))]
fn pom_coordinate_must_match_its_path(repository: Repository, #[case] xml: String) {
    std::fs::write(repository.path("lucene-core", ".pom"), xml).expect("rewrite pom");
    let err = check_deployed_coordinates(&repository.artifacts(), VERSION).expect_err("mismatch");
    assert!(matches!(err, CoordinateError::PathMismatch { .. }), "{err}");
}

#[rstest]
fn pom_packaging_needs_a_deployed_artifact(repository: Repository) {
    std::fs::write(repository.path("lucene-core", ".pom"), pom("lucene-core", VERSION, "war")).expect("rewrite");
    let err = check_deployed_coordinates(&repository.artifacts(), VERSION).expect_err("no war");
    assert!(err.to_string().contains("missing corresponding .war artifact"), "{err}");
}

#[rstest]
fn corrupted_digest_is_a_mismatch(repository: Repository) {
    let digest = companion(&repository.path("lucene-core", ".jar"), "sha1");
    std::fs::write(&digest, "0000000000000000000000000000000000000000").expect("corrupt");
    let err = check_digests(&repository.artifacts(), &ALGORITHMS).expect_err("mismatch");
    assert!(matches!(err, DigestError::Mismatch { algorithm: DigestAlgorithm::Sha1, .. }), "{err}");
}

#[rstest]
fn absent_digest_is_reported(repository: Repository) {
    std::fs::remove_file(companion(&repository.path("lucene-core", ".pom"), "md5")).expect("remove");
    let err = check_digests(&repository.artifacts(), &ALGORITHMS).expect_err("missing");
    assert!(matches!(err, DigestError::Missing { algorithm: DigestAlgorithm::Md5, .. }), "{err}");
}

#[rstest]
fn every_deployable_template_needs_an_artifact(repository: Repository) {
    let templates = tempfile::tempdir().expect("templates");
    write_file(
        templates.path(),
        "lucene/core/pom.xml.template",
        &pom("lucene-core", "@version@", "jar"),
    );
    write_file(
        templates.path(),
        "lucene/test/pom.xml.template",
        r#"<project xmlns="http://maven.apache.org/POM/4.0.0">
  <groupId>org.apache.lucene</groupId>
  <artifactId>lucene-internal-tests</artifactId>
  <version>@version@</version>
  <build><plugins><plugin>
    <artifactId>maven-deploy-plugin</artifactId>
    <configuration><skip>true</skip></configuration>
  </plugin></plugins></build>
</project>"#,
    );
    let core = templates.path().join("lucene/core/pom.xml.template");
    let skipped = templates.path().join("lucene/test/pom.xml.template");
    let artifacts = repository.artifacts();
    check_artifact_per_template(&[core.as_path(), skipped.as_path()], &artifacts, &repository.root(), VERSION)
        .expect("core is deployed and the test module is skipped");

    write_file(templates.path(), "lucene/misc/pom.xml.template", &pom("lucene-misc", "@version@", "jar"));
    let misc = templates.path().join("lucene/misc/pom.xml.template");
    let err = check_artifact_per_template(&[misc.as_path()], &artifacts, &repository.root(), VERSION)
        .expect_err("misc is not deployed");
    assert!(matches!(
        err,
        CoordinateError::MissingTemplateArtifact { ref artifact, .. }
            if artifact.ends_with("lucene-misc/5.1.0/lucene-misc-5.1.0.jar")
    ));
}

fn key_ring(dir: &Path) -> KeyRing {
    KeyRing {
        project: "lucene".to_owned(),
        keys_file: dir.join("lucene.KEYS"),
        clean_home: dir.join("lucene.gpg"),
        log_dir: dir.to_owned(),
    }
}

#[rstest]
fn signatures_are_verified_and_warnings_surface(repository: Repository) {
    let mut verifier = MockSignatureVerifier::new();
    verifier
        .expect_verify()
        .times(4)
        .returning(|_, artifact, signature| {
            assert_eq!(companion(artifact, "asc"), signature);
            let warnings = if artifact.extension().is_some_and(|e| e == "pom") {
                vec!["GPG: WARNING: key expired".to_owned()]
            } else {
                Vec::new()
            };
            Ok(warnings)
        });
    let rings = [key_ring(repository.dir.path())];

    let mut buf = Vec::new();
    let mut log = VerificationLog::new(&mut buf, true);
    check_signatures(&verifier, &rings, &repository.artifacts(), "asc", &mut log).expect("signed");
    assert_eq!(log.warnings().len(), 1);
    assert!(log.warnings()[0].contains("key expired"));
}

#[rstest]
fn missing_signature_is_rejected(repository: Repository) {
    std::fs::remove_file(companion(&repository.path("lucene-core", ".jar"), "asc")).expect("remove");
    let mut verifier = MockSignatureVerifier::new();
    verifier.expect_verify().returning(|_, _, _| Ok(Vec::new()));
    let rings = [key_ring(repository.dir.path())];

    let mut buf = Vec::new();
    let mut log = VerificationLog::new(&mut buf, true);
    let err = check_signatures(&verifier, &rings, &repository.artifacts(), "asc", &mut log)
        .expect_err("unsigned jar");
    assert!(matches!(err, SmokeError::CoordinateMismatch(CoordinateError::MissingCompanion { .. })));
}

#[rstest]
#[case::identical(true, None)]
#[case::diverging(false, Some("is not identical to"))]
fn release_jars_match_the_binary_distribution(
    repository: Repository,
    #[case] same_bytes: bool,
    #[case] failure: Option<&str>,
) {
    let dist = tempfile::tempdir().expect("dist");
    let jar = repository.path("lucene-core", ".jar");
    let distributed = dist.path().join("lucene-5.1.0/core/lucene-core-5.1.0.jar");
    std::fs::create_dir_all(distributed.parent().expect("parent")).expect("mkdir");
    if same_bytes {
        std::fs::copy(&jar, &distributed).expect("copy");
    } else {
        std::fs::write(&distributed, "rebuilt").expect("write");
    }
    let distributions = BTreeMap::from([(
        "lucene".to_owned(),
        DistributionIndex::build(dist.path()).expect("index"),
    )]);

    let result = check_identical(&repository.artifacts(), &distributions, VERSION);
    match failure {
        None => result.expect("identical"),
        Some(text) => {
            let err = result.expect_err("diverging");
            assert!(err.to_string().contains(text), "{err}");
        }
    }
}

#[rstest]
fn release_jar_absent_from_distribution_is_rejected(repository: Repository) {
    let dist = tempfile::tempdir().expect("dist");
    let distributions = BTreeMap::from([(
        "lucene".to_owned(),
        DistributionIndex::build(dist.path()).expect("index"),
    )]);
    let err = check_identical(&repository.artifacts(), &distributions, VERSION).expect_err("absent");
    assert!(matches!(err, SmokeError::MissingFromDistribution { ref project, .. } if project == "lucene"));
}

//! Checksum verification of cached artifacts.
//!
//! All configured algorithms are computed in a single streamed pass over the
//! file; nothing is buffered beyond one chunk.

use sha2::Digest;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default read size for digest computation.
pub const DIGEST_CHUNK: usize = 65536;

/// Errors raised while checking published digests.
#[derive(Debug, Error)]
pub enum DigestError {
    /// The recomputed digest differs from the published one.
    #[error("{algorithm} digest mismatch for {artifact}: expected {expected} but got {actual}")]
    Mismatch {
        /// Digest algorithm.
        algorithm: DigestAlgorithm,
        /// Artifact whose content was hashed.
        artifact: String,
        /// Published digest.
        expected: String,
        /// Recomputed digest.
        actual: String,
    },

    /// The digest file lists a different file name than the artifact.
    #[error("{digest_file} lists artifact {listed} but expected *{expected}")]
    NameMismatch {
        /// The digest file.
        digest_file: String,
        /// File name found in the digest file.
        listed: String,
        /// The artifact's file name.
        expected: String,
    },

    /// The digest file is not in a recognised format.
    #[error("malformed digest file {digest_file}: {reason}")]
    Malformed {
        /// The digest file.
        digest_file: String,
        /// What was wrong.
        reason: String,
    },

    /// A digest file expected next to an artifact is missing.
    #[error("missing {algorithm} digest for {}", artifact.display())]
    Missing {
        /// Digest algorithm.
        algorithm: DigestAlgorithm,
        /// Artifact lacking the digest.
        artifact: PathBuf,
    },

    /// The artifact or digest file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The unreadable file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Digest algorithms that can be published next to an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// MD5.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-512.
    Sha512,
}

impl DigestAlgorithm {
    /// Map a digest file suffix (`md5`, `sha1`, `sha512`) to an algorithm.
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Digest file suffix.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha512 => "sha512",
        }
    }

    fn hasher(self) -> Hasher {
        match self {
            Self::Md5 => Hasher::Md5(md5::Md5::new()),
            Self::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            Self::Sha512 => Hasher::Sha512(sha2::Sha512::new()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha512 => "SHA512",
        })
    }
}

enum Hasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha512(sha2::Sha512),
}

impl Hasher {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Md5(h) => h.update(bytes),
            Self::Sha1(h) => h.update(bytes),
            Self::Sha512(h) => h.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha1(h) => format!("{:x}", h.finalize()),
            Self::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Compute every algorithm in `algorithms` over `reader` in one pass, reading
/// `chunk_size` bytes at a time. Returns lowercase hex, in input order.
///
/// # Errors
///
/// Returns any read error.
pub fn compute_digests_from(
    reader: &mut dyn Read,
    algorithms: &[DigestAlgorithm],
    chunk_size: usize,
) -> std::io::Result<Vec<String>> {
    let mut hashers: Vec<Hasher> = algorithms.iter().map(|a| a.hasher()).collect();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for hasher in &mut hashers {
            hasher.update(&buffer[..bytes_read]);
        }
    }
    Ok(hashers.into_iter().map(Hasher::finalize_hex).collect())
}

/// Compute digests of the file at `path`.
///
/// # Errors
///
/// Returns [`DigestError::Io`] if the file cannot be read.
pub fn compute_digests(
    path: &Path,
    algorithms: &[DigestAlgorithm],
) -> Result<Vec<String>, DigestError> {
    let io_err = |source| DigestError::Io {
        path: path.to_owned(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    compute_digests_from(&mut file, algorithms, DIGEST_CHUNK).map_err(io_err)
}

/// A published digest value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedDigest {
    /// Algorithm the value was computed with.
    pub algorithm: DigestAlgorithm,
    /// Hex digest as published.
    pub hex: String,
}

/// Parse a distribution digest file of the form `<hex> *<file name>`.
///
/// The listed name must equal `artifact_name` exactly.
///
/// # Errors
///
/// Returns [`DigestError::Malformed`] or [`DigestError::NameMismatch`].
///
/// # Examples
///
/// ```
/// use smoketest::verify::digest::parse_listed_digest;
///
/// let hex = parse_listed_digest("abc123 *lucene-5.1.0.tgz\n", "lucene-5.1.0.tgz.md5", "lucene-5.1.0.tgz")?;
/// assert_eq!(hex, "abc123");
/// # Ok::<(), smoketest::verify::digest::DigestError>(())
/// ```
pub fn parse_listed_digest(
    text: &str,
    digest_file: &str,
    artifact_name: &str,
) -> Result<String, DigestError> {
    let mut fields = text.split_whitespace();
    let (Some(hex), Some(listed), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(DigestError::Malformed {
            digest_file: digest_file.to_owned(),
            reason: "expected \"<hex> *<file name>\"".to_owned(),
        });
    };
    if listed.strip_prefix('*') != Some(artifact_name) {
        return Err(DigestError::NameMismatch {
            digest_file: digest_file.to_owned(),
            listed: listed.to_owned(),
            expected: artifact_name.to_owned(),
        });
    }
    Ok(hex.to_owned())
}

/// Parse a repository digest file holding only the hex value.
///
/// # Errors
///
/// Returns [`DigestError::Malformed`] if the file does not hold exactly one
/// token.
pub fn parse_bare_digest(text: &str, digest_file: &str) -> Result<String, DigestError> {
    let mut fields = text.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(hex), None) => Ok(hex.to_owned()),
        _ => Err(DigestError::Malformed {
            digest_file: digest_file.to_owned(),
            reason: "expected a single hex digest".to_owned(),
        }),
    }
}

/// Recompute every expected digest over `artifact` and compare them
/// case-insensitively.
///
/// # Errors
///
/// Returns [`DigestError::Mismatch`] naming the expected and actual values
/// for the first algorithm that differs.
pub fn verify_digests(artifact: &Path, expected: &[ExpectedDigest]) -> Result<(), DigestError> {
    let algorithms: Vec<_> = expected.iter().map(|e| e.algorithm).collect();
    let actual = compute_digests(artifact, &algorithms)?;
    for (want, got) in expected.iter().zip(actual) {
        if !want.hex.eq_ignore_ascii_case(&got) {
            return Err(DigestError::Mismatch {
                algorithm: want.algorithm,
                artifact: artifact
                    .file_name()
                    .map_or_else(|| artifact.display().to_string(), |n| n.to_string_lossy().into_owned()),
                expected: want.hex.clone(),
                actual: got,
            });
        }
    }
    log::trace!("digests verified for {}", artifact.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    #[rstest]
    #[case::single_byte(1)]
    #[case::odd(7)]
    #[case::default(DIGEST_CHUNK)]
    fn chunk_size_does_not_change_digests(#[case] chunk: usize) {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let all = [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha512];
        let reference = compute_digests_from(&mut Cursor::new(&data), &all, 4096).expect("digest");
        let chunked = compute_digests_from(&mut Cursor::new(&data), &all, chunk).expect("digest");
        assert_eq!(chunked, reference);
    }

    #[rstest]
    fn known_vectors() {
        let digests = compute_digests_from(
            &mut Cursor::new(b"abc"),
            &[DigestAlgorithm::Sha1],
            DIGEST_CHUNK,
        )
        .expect("digest");
        assert_eq!(digests, vec![ABC_SHA1]);

        let empty = compute_digests_from(&mut Cursor::new(b""), &[DigestAlgorithm::Md5], 3)
            .expect("digest");
        assert_eq!(empty, vec![EMPTY_MD5]);
    }

    #[rstest]
    #[case::wrong_name("abc *solr-5.1.0.tgz", true)]
    #[case::missing_star("abc lucene-5.1.0.tgz", true)]
    #[case::listed("abc *lucene-5.1.0.tgz", false)]
    fn listed_digest_name_must_match(#[case] text: &str, #[case] rejected: bool) {
        let parsed = parse_listed_digest(text, "lucene-5.1.0.tgz.md5", "lucene-5.1.0.tgz");
        assert_eq!(matches!(parsed, Err(DigestError::NameMismatch { .. })), rejected);
    }

    #[rstest]
    fn listed_digest_rejects_extra_fields() {
        assert!(matches!(
            parse_listed_digest("a *b c", "b.md5", "b"),
            Err(DigestError::Malformed { .. })
        ));
    }

    #[rstest]
    fn bare_digest_is_trimmed() {
        assert_eq!(parse_bare_digest("  ABC\n", "x.jar.sha1").expect("parse"), "ABC");
        assert!(parse_bare_digest("", "x.jar.sha1").is_err());
    }

    #[rstest]
    fn verify_is_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("abc.jar");
        std::fs::write(&path, b"abc").expect("write");

        let expected = [ExpectedDigest {
            algorithm: DigestAlgorithm::Sha1,
            hex: ABC_SHA1.to_uppercase(),
        }];
        verify_digests(&path, &expected).expect("digests match");
    }

    #[rstest]
    fn mismatch_names_both_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lucene-9.0.0.tgz");
        std::fs::write(&path, b"not empty").expect("write");

        let err = verify_digests(
            &path,
            &[ExpectedDigest {
                algorithm: DigestAlgorithm::Md5,
                hex: EMPTY_MD5.to_owned(),
            }],
        )
        .expect_err("content differs");

        let msg = err.to_string();
        assert!(msg.contains(EMPTY_MD5), "{msg}");
        assert!(msg.contains("lucene-9.0.0.tgz"), "{msg}");
        match err {
            DigestError::Mismatch { actual, .. } => assert!(msg.contains(&actual)),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }
}

//! Archive extraction into a scratch directory.
//!
//! Distribution archives are `.tgz` or `.zip` files that must expand to a
//! single `{project}-{version}` directory. Entry paths are validated before
//! anything is written so an archive cannot escape the scratch directory.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors arising from archive extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("failed to unpack {}: {source}", archive.display())]
    Io {
        /// The archive being unpacked.
        archive: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The zip container is corrupt.
    #[error("failed to read zip archive {}: {reason}", archive.display())]
    Zip {
        /// The archive being unpacked.
        archive: PathBuf,
        /// Description from the zip reader.
        reason: String,
    },

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive file name has no supported extension.
    #[error("unsupported archive format: {}", archive.display())]
    UnsupportedFormat {
        /// The archive.
        archive: PathBuf,
    },

    /// The archive does not expand to exactly the expected directory.
    #[error("unpack produced entries {found:?}; expected only {expected}")]
    UnexpectedTopLevel {
        /// Top-level entries that were produced.
        found: Vec<String>,
        /// The single entry that was expected.
        expected: String,
    },
}

/// Supported archive containers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar.
    TarGz,
    /// Zip.
    Zip,
}

impl ArchiveFormat {
    /// Detect the format from the file name.
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
            Some(Self::TarGz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Unpack `archive` into a fresh `dest_dir` and return the single expected
/// top-level directory, `dest_dir/{expected_root}`.
///
/// Any previous contents of `dest_dir` are removed first.
///
/// # Errors
///
/// Returns [`ExtractionError::UnexpectedTopLevel`] if the archive expands to
/// anything other than `expected_root`, and other variants for unreadable or
/// malicious archives.
pub fn unpack(archive: &Path, dest_dir: &Path, expected_root: &str) -> Result<PathBuf, ExtractionError> {
    let io_err = |source| ExtractionError::Io {
        archive: archive.to_owned(),
        source,
    };
    if dest_dir.exists() {
        std::fs::remove_dir_all(dest_dir).map_err(io_err)?;
    }
    std::fs::create_dir_all(dest_dir).map_err(io_err)?;

    match ArchiveFormat::detect(archive) {
        Some(ArchiveFormat::TarGz) => extract_tar_gz(archive, dest_dir)?,
        Some(ArchiveFormat::Zip) => extract_zip(archive, dest_dir)?,
        None => {
            return Err(ExtractionError::UnsupportedFormat {
                archive: archive.to_owned(),
            });
        }
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dest_dir).map_err(io_err)? {
        found.push(entry.map_err(io_err)?.file_name().to_string_lossy().into_owned());
    }
    found.sort();
    if found != [expected_root] {
        return Err(ExtractionError::UnexpectedTopLevel {
            found,
            expected: expected_root.to_owned(),
        });
    }
    Ok(dest_dir.join(expected_root))
}

fn extract_tar_gz(archive: &Path, dest_dir: &Path) -> Result<(), ExtractionError> {
    let io_err = |source| ExtractionError::Io {
        archive: archive.to_owned(),
        source,
    };
    let file = File::open(archive).map_err(io_err)?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    for entry_result in tar.entries().map_err(io_err)? {
        let mut entry = entry_result.map_err(io_err)?;
        let entry_path = entry.path().map_err(io_err)?.into_owned();
        validate_entry_path(&entry_path)?;
        let dest_path = dest_dir.join(&entry_path);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        entry.unpack(&dest_path).map_err(io_err)?;
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<(), ExtractionError> {
    let io_err = |source| ExtractionError::Io {
        archive: archive.to_owned(),
        source,
    };
    let zip_err = |e: zip::result::ZipError| ExtractionError::Zip {
        archive: archive.to_owned(),
        reason: e.to_string(),
    };
    let file = File::open(archive).map_err(io_err)?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_err)?;
        let entry_path = PathBuf::from(entry.name());
        validate_entry_path(&entry_path)?;
        let dest_path = dest_dir.join(&entry_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&dest_path).map_err(io_err)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out = File::create(&dest_path).map_err(io_err)?;
        std::io::copy(&mut entry, &mut out).map_err(io_err)?;
        if let Some(mode) = entry.unix_mode() {
            set_mode(&dest_path, mode).map_err(io_err)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Validate that an archive entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

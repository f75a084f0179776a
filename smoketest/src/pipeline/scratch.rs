//! The scratch directory a run owns exclusively.

use crate::error::{Result, SmokeError};
use crate::fetch::CachePolicy;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file created inside the scratch directory.
pub const LOCK_FILE: &str = ".smoketest.lock";

/// An exclusively locked scratch directory. The lock is released on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    lock: File,
}

impl ScratchDir {
    /// Create and lock `path`.
    ///
    /// Under [`CachePolicy::ForceClean`] the directory must not exist yet;
    /// under [`CachePolicy::Reuse`] an existing directory is adopted as long
    /// as no other run holds it.
    ///
    /// # Errors
    ///
    /// Returns [`SmokeError::Precondition`] if the directory exists when it
    /// must not, or another run holds the lock.
    pub fn acquire(path: &Path, policy: CachePolicy) -> Result<Self> {
        if policy == CachePolicy::ForceClean && path.exists() {
            return Err(SmokeError::precondition(format!(
                "temp dir {} exists; please remove first",
                path.display()
            )));
        }
        std::fs::create_dir_all(path)?;
        let lock_path = path.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        match FileExt::try_lock_exclusive(&lock) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(SmokeError::precondition(format!(
                    "temp dir {} is in use by another run",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }
        log::debug!("locked scratch directory {}", path.display());
        Ok(Self {
            path: path.to_owned(),
            lock,
        })
    }

    /// The locked directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock) {
            log::debug!("failed to unlock {}: {e}", self.path.display());
        }
    }
}

/// The first of `base`, `base_1`, `base_2`, ... that does not exist yet.
#[must_use]
pub fn first_free(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_owned();
    }
    let mut n = 1_u32;
    loop {
        let mut name = base.as_os_str().to_owned();
        name.push(format!("_{n}"));
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn existing_directory_is_refused_when_forcing_clean() {
        let root = tempfile::tempdir().expect("tempdir");
        let err = ScratchDir::acquire(root.path(), CachePolicy::ForceClean).expect_err("exists");
        assert!(err.to_string().contains("please remove first"), "{err}");
    }

    #[rstest]
    fn second_run_cannot_share_the_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let scratch = root.path().join("smoke");
        let held = ScratchDir::acquire(&scratch, CachePolicy::ForceClean).expect("first run");
        assert!(scratch.join(LOCK_FILE).is_file());

        let err = ScratchDir::acquire(&scratch, CachePolicy::Reuse).expect_err("locked");
        assert!(err.to_string().contains("in use by another run"), "{err}");

        drop(held);
        ScratchDir::acquire(&scratch, CachePolicy::Reuse).expect("lock released");
    }

    #[rstest]
    fn first_free_skips_existing_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path().join("smoke_lucene_5.1.0_123");
        assert_eq!(first_free(&base), base);

        std::fs::create_dir(&base).expect("mkdir");
        std::fs::create_dir(root.path().join("smoke_lucene_5.1.0_123_1")).expect("mkdir");
        assert_eq!(first_free(&base), root.path().join("smoke_lucene_5.1.0_123_2"));
    }
}

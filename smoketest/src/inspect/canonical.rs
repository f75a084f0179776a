//! Canonical notice and license texts.
//!
//! The first distribution unpacked for a project supplies its canonical
//! `NOTICE.txt` and `LICENSE.txt`. Every package later inspected must embed
//! exactly those texts. Each project's slot is written at most once.

use std::path::Path;
use std::sync::OnceLock;

/// The notice and license of one project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalText {
    /// Contents of the top-level `NOTICE.txt`.
    pub notice: String,
    /// Contents of the top-level `LICENSE.txt`.
    pub license: String,
}

impl CanonicalText {
    /// Read both texts from an unpacked distribution root.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if either file is missing or is not UTF-8.
    pub fn read_from(root: &Path) -> std::io::Result<Self> {
        Ok(Self {
            notice: std::fs::read_to_string(root.join("NOTICE.txt"))?,
            license: std::fs::read_to_string(root.join("LICENSE.txt"))?,
        })
    }
}

/// Canonical texts keyed by project.
#[derive(Debug, Default)]
pub struct CanonicalTexts {
    slots: Vec<(String, OnceLock<CanonicalText>)>,
}

impl CanonicalTexts {
    /// Create empty slots for `projects`.
    pub fn new<I, S>(projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: projects
                .into_iter()
                .map(|name| (name.into(), OnceLock::new()))
                .collect(),
        }
    }

    /// Record `project`'s texts from `root` unless already recorded, and
    /// return the recorded texts.
    ///
    /// Returns `Ok(None)` for an unknown project.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the texts have to be read and cannot be.
    pub fn record_from(&self, project: &str, root: &Path) -> std::io::Result<Option<&CanonicalText>> {
        let Some(slot) = self.slot(project) else {
            return Ok(None);
        };
        if slot.get().is_none() {
            let text = CanonicalText::read_from(root)?;
            log::debug!("recorded canonical notice/license for {project} from {}", root.display());
            let _ = slot.set(text);
        }
        Ok(slot.get())
    }

    /// Texts recorded for `project`.
    #[must_use]
    pub fn get(&self, project: &str) -> Option<&CanonicalText> {
        self.slot(project).and_then(OnceLock::get)
    }

    /// The project owning a package, by the project name that occurs
    /// earliest in its lower-cased file name.
    #[must_use]
    pub fn owner_of(&self, file_name: &str) -> Option<&str> {
        let lower = file_name.to_lowercase();
        self.slots
            .iter()
            .filter_map(|(name, _)| lower.find(name.as_str()).map(|at| (at, name.as_str())))
            .min_by_key(|(at, _)| *at)
            .map(|(_, name)| name)
    }

    fn slot(&self, project: &str) -> Option<&OnceLock<CanonicalText>> {
        self.slots
            .iter()
            .find(|(name, _)| name == project)
            .map(|(_, slot)| slot)
    }
}

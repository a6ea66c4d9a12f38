//! Curation states and the directory layout that encodes them.

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SieveError};

/// Where a file stands in curation. Derived from its directory, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurationState {
    /// Ingested, identity not yet confirmed.
    Unexplored,
    /// Patient ID found in the registry, awaiting cross-verification.
    Checking,
    /// Could not be verified; needs manual attention.
    Unsolvable,
    /// Verified and accepted.
    Dicom,
}

impl CurationState {
    /// All states in pipeline order.
    pub const ALL: [CurationState; 4] = [
        CurationState::Unexplored,
        CurationState::Checking,
        CurationState::Unsolvable,
        CurationState::Dicom,
    ];

    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            CurationState::Unexplored => "unexplored",
            CurationState::Checking => "checking",
            CurationState::Unsolvable => "unsolvable",
            CurationState::Dicom => "dicom",
        }
    }

    /// Check if no automatic transition leaves this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CurationState::Unsolvable | CurationState::Dicom)
    }

    /// Check if the normal flow may move a file from `self` to `next`.
    pub fn can_advance_to(&self, next: CurationState) -> bool {
        matches!(
            (self, next),
            (CurationState::Unexplored, CurationState::Checking)
                | (CurationState::Checking, CurationState::Unsolvable)
                | (CurationState::Checking, CurationState::Dicom)
        )
    }
}

impl fmt::Display for CurationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CurationState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unexplored" => Ok(CurationState::Unexplored),
            "checking" => Ok(CurationState::Checking),
            "unsolvable" => Ok(CurationState::Unsolvable),
            "dicom" | "accepted" => Ok(CurationState::Dicom),
            _ => Err(format!(
                "Unknown state: {}. Use unexplored, checking, unsolvable, or dicom.",
                s
            )),
        }
    }
}

/// The four sibling directories that hold each state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationLayout {
    pub unexplored: PathBuf,
    pub checking: PathBuf,
    pub unsolvable: PathBuf,
    pub dicom: PathBuf,
}

impl Default for CurationLayout {
    fn default() -> Self {
        Self::under("curation")
    }
}

impl CurationLayout {
    /// Conventional layout: one subdirectory per state under `root`.
    ///
    /// # Example
    ///
    /// ```
    /// use sieve::{CurationLayout, CurationState};
    ///
    /// let layout = CurationLayout::under("data/curation");
    /// assert_eq!(
    ///     layout.dir(CurationState::Checking).to_string_lossy(),
    ///     "data/curation/checking"
    /// );
    /// ```
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            unexplored: root.join(CurationState::Unexplored.label()),
            checking: root.join(CurationState::Checking.label()),
            unsolvable: root.join(CurationState::Unsolvable.label()),
            dicom: root.join(CurationState::Dicom.label()),
        }
    }

    /// Directory holding files in `state`.
    pub fn dir(&self, state: CurationState) -> &Path {
        match state {
            CurationState::Unexplored => &self.unexplored,
            CurationState::Checking => &self.checking,
            CurationState::Unsolvable => &self.unsolvable,
            CurationState::Dicom => &self.dicom,
        }
    }

    /// State of the file at `path`, from the directory that contains it.
    ///
    /// Relative paths on either side are resolved against the current
    /// directory first. With nested directories the deepest match wins.
    pub fn state_of(&self, path: &Path) -> Option<CurationState> {
        let path = absolute(path);
        CurationState::ALL
            .into_iter()
            .map(|state| (state, absolute(self.dir(state))))
            .filter(|(_, dir)| path.starts_with(dir))
            .max_by_key(|(_, dir)| dir.components().count())
            .map(|(state, _)| state)
    }

    /// Reject layouts where two states share a directory.
    pub fn validate(&self) -> Result<()> {
        for (i, a) in CurationState::ALL.iter().enumerate() {
            for b in &CurationState::ALL[i + 1..] {
                if self.dir(*a) == self.dir(*b) {
                    return Err(SieveError::Config(format!(
                        "states '{}' and '{}' share directory '{}'",
                        a,
                        b,
                        self.dir(*a).display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create every state directory that does not exist yet.
    pub fn ensure_dirs(&self) -> Result<()> {
        for state in CurationState::ALL {
            let dir = self.dir(state);
            fs::create_dir_all(dir).map_err(|e| SieveError::io(dir, e))?;
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Cow<'_, Path> {
    if path.is_absolute() {
        return Cow::Borrowed(path);
    }
    std::path::absolute(path)
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed(path))
}

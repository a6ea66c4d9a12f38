//! Recursive discovery of candidate files.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, SieveError};

/// System and bookkeeping files that are never curated.
const DEFAULT_IGNORED: [&str; 5] = [".DS_Store", "Thumbs.db", "DICOMDIR", "LOCKFILE", "VERSION"];

/// Walks a directory tree and returns regular files in lexical path order.
#[derive(Debug, Clone)]
pub struct FileScanner {
    ignored: Vec<String>,
    max_depth: Option<usize>,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileScanner {
    /// Scanner with the default ignore list.
    pub fn new() -> Self {
        Self {
            ignored: DEFAULT_IGNORED.iter().map(|n| n.to_lowercase()).collect(),
            max_depth: None,
        }
    }

    /// Also ignore files named `name` (case-insensitive).
    pub fn ignore(mut self, name: &str) -> Self {
        self.ignored.push(name.to_lowercase());
        self
    }

    /// Limit recursion depth; 1 lists only direct children.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Whether `name` is on the ignore list.
    pub fn is_ignored(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.ignored.iter().any(|ignored| *ignored == lower)
    }

    /// List every regular, non-ignored file under `root`, sorted.
    ///
    /// Unreadable entries are logged and skipped; a missing root is an error.
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(SieveError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .max_depth(self.max_depth.unwrap_or(usize::MAX));

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if self.wanted(&entry) => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!(root = %root.display(), error = %e, "Skipping unreadable entry"),
            }
        }
        files.sort();

        debug!(root = %root.display(), files = files.len(), "Scan complete");
        Ok(files)
    }

    fn wanted(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_none_or(|name| !self.is_ignored(name))
    }
}

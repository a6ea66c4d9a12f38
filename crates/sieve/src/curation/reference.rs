//! Index of the non-anonymized reference population.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::batch::FileScanner;
use crate::error::Result;
use crate::metadata::{CrossKey, ImagingTags, MetadataExtractor};

/// One readable reference file and its tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFile {
    pub path: PathBuf,
    pub tags: ImagingTags,
}

/// Reference files grouped by cross-verification key.
///
/// Built once per run and shared read-only. Candidates for a key are always
/// returned in lexical path order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    files: Vec<ReferenceFile>,
    by_key: HashMap<CrossKey, Vec<usize>>,
    unreadable: Vec<PathBuf>,
}

impl ReferenceIndex {
    /// Scan `root` and read the tags of every file in it.
    ///
    /// Files that cannot be read are logged and left out of the index.
    pub fn build(
        root: &Path,
        extractor: &dyn MetadataExtractor,
        scanner: &FileScanner,
    ) -> Result<Self> {
        let paths = scanner.scan(root)?;

        let results: Vec<(PathBuf, Result<ImagingTags>)> = paths
            .into_par_iter()
            .map(|path| {
                let tags = extractor.extract(&path);
                (path, tags)
            })
            .collect();

        let mut files = Vec::with_capacity(results.len());
        let mut unreadable = Vec::new();
        for (path, tags) in results {
            match tags {
                Ok(tags) => files.push(ReferenceFile { path, tags }),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Unreadable reference file");
                    unreadable.push(path);
                }
            }
        }

        let mut index = Self::from_files(files);
        index.unreadable = unreadable;
        info!(
            root = %root.display(),
            indexed = index.len(),
            unreadable = index.unreadable.len(),
            "Reference index built"
        );
        Ok(index)
    }

    /// Index already-extracted files.
    pub fn from_files(mut files: Vec<ReferenceFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut by_key: HashMap<CrossKey, Vec<usize>> = HashMap::new();
        for (i, file) in files.iter().enumerate() {
            if let Some(key) = file.tags.cross_key() {
                by_key.entry(key).or_default().push(i);
            }
        }

        Self {
            files,
            by_key,
            unreadable: Vec::new(),
        }
    }

    /// Reference files sharing `key`, lexically ordered.
    pub fn candidates<'a>(&'a self, key: &CrossKey) -> impl Iterator<Item = &'a ReferenceFile> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(|&i| &self.files[i])
    }

    /// Number of indexed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether nothing was indexed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files that could not be read while building.
    pub fn unreadable(&self) -> &[PathBuf] {
        &self.unreadable
    }
}

//! In-memory patient registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::sanitize::sanitize;

/// One accepted registry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// 1-based data row (header excluded) where the ID first appeared.
    pub row: usize,
    /// Sanitized anonymized patient ID.
    pub id: String,
    /// The ID exactly as written in the source.
    pub raw_id: String,
    /// Sanitized non-anonymized patient ID, when a linked column is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_id: Option<String>,
}

/// Which registry column a duplicate was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdColumn {
    /// The anonymized ID column.
    Anonymized,
    /// The linked (non-anonymized) ID column.
    Linked,
}

impl IdColumn {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            IdColumn::Anonymized => "anonymized",
            IdColumn::Linked => "linked",
        }
    }
}

/// An identifier that occurred on more than one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateId {
    pub column: IdColumn,
    pub id: String,
    /// Every data row carrying the ID, in file order.
    pub rows: Vec<usize>,
}

/// Authoritative set of approved patient IDs.
///
/// Read-only once loaded. The first row carrying an ID wins; repeats are
/// counted once and kept only for [`Registry::duplicates`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    source: Option<PathBuf>,
    entries: IndexMap<String, RegistryEntry>,
    linked: HashMap<String, String>,
    occurrences: IndexMap<(IdColumn, String), Vec<usize>>,
    skipped_rows: usize,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from raw IDs, one per row. Mostly useful in tests.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for (index, id) in ids.into_iter().enumerate() {
            registry.insert(index + 1, id.as_ref(), None);
        }
        registry
    }

    pub(crate) fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(path.to_path_buf());
        self
    }

    pub(crate) fn note_skipped(&mut self) {
        self.skipped_rows += 1;
    }

    /// Add a row. Returns `false` when the ID sanitizes to nothing.
    pub(crate) fn insert(&mut self, row: usize, raw_id: &str, raw_linked: Option<&str>) -> bool {
        let id = sanitize(raw_id);
        if id.is_empty() {
            return false;
        }
        let linked_id = raw_linked.map(sanitize).filter(|l| !l.is_empty());

        self.occurrences
            .entry((IdColumn::Anonymized, id.clone()))
            .or_default()
            .push(row);

        if let Some(linked) = &linked_id {
            self.occurrences
                .entry((IdColumn::Linked, linked.clone()))
                .or_default()
                .push(row);
            self.linked.entry(linked.clone()).or_insert_with(|| id.clone());
        }

        self.entries.entry(id.clone()).or_insert_with(|| RegistryEntry {
            row,
            id,
            raw_id: raw_id.trim().to_string(),
            linked_id,
        });
        true
    }

    /// Whether the identifier is an approved anonymized ID.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(&sanitize(id))
    }

    /// Look up the entry for an anonymized ID.
    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(&sanitize(id))
    }

    /// Find the entry an identifier belongs to, through either the
    /// anonymized or the linked column.
    pub fn resolve(&self, id: &str) -> Option<&RegistryEntry> {
        let key = sanitize(id);
        self.entries
            .get(&key)
            .or_else(|| self.linked.get(&key).and_then(|anon| self.entries.get(anon)))
    }

    /// Number of unique anonymized IDs.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Whether no IDs were loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any row carried a linked (non-anonymized) ID.
    pub fn has_linked_ids(&self) -> bool {
        !self.linked.is_empty()
    }

    /// Rows ignored during load (too few columns or blank ID).
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Path the registry was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Iterate entries in first-seen order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    /// Identifiers that appear on more than one row, anonymized column first.
    pub fn duplicates(&self) -> Vec<DuplicateId> {
        let mut duplicates: Vec<DuplicateId> = self
            .occurrences
            .iter()
            .filter(|(_, rows)| rows.len() > 1)
            .map(|((column, id), rows)| DuplicateId {
                column: *column,
                id: id.clone(),
                rows: rows.clone(),
            })
            .collect();
        duplicates.sort_by_key(|d| (d.column == IdColumn::Linked, d.rows[0]));
        duplicates
    }
}

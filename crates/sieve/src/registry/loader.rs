//! CSV loader for the patient registry.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SieveError};

use super::table::Registry;

/// Where the registry lives and how its columns are laid out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the registry CSV.
    pub path: PathBuf,
    /// Zero-based position of the anonymized ID column.
    pub id_column: usize,
    /// Zero-based position of the non-anonymized ID column, if present.
    pub linked_column: Option<usize>,
    /// Field delimiter.
    pub delimiter: char,
    /// Whether the first row is a header.
    pub has_header: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("registry.csv"),
            id_column: 1,
            linked_column: None,
            delimiter: ',',
            has_header: true,
        }
    }
}

impl RegistryConfig {
    /// Point the configuration at a registry file.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the anonymized ID column.
    pub fn with_id_column(mut self, column: usize) -> Self {
        self.id_column = column;
        self
    }

    /// Set the linked ID column.
    pub fn with_linked_column(mut self, column: usize) -> Self {
        self.linked_column = Some(column);
        self
    }

    fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(SieveError::Config(format!(
                "registry delimiter must be ASCII, got {:?}",
                self.delimiter
            )))
        }
    }
}

impl Registry {
    /// Load the registry described by `config`.
    ///
    /// A missing or unreadable file, or one with no usable rows, is a
    /// `RegistryLoad` error. Individual rows that are too short or carry a
    /// blank ID are skipped with a warning.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sieve::{Registry, RegistryConfig};
    ///
    /// let config = RegistryConfig::default().with_path("anonymized_patients.csv");
    /// let registry = Registry::load(&config).unwrap();
    /// println!("{} approved patients", registry.size());
    /// ```
    pub fn load(config: &RegistryConfig) -> Result<Self> {
        let path = config.path.as_path();
        let file = File::open(path).map_err(|e| load_error(path, e.to_string()))?;
        let registry = Self::from_reader(file, config)?.with_source(path);

        if registry.is_empty() {
            return Err(load_error(path, "no usable registry rows".to_string()));
        }

        info!(
            path = %path.display(),
            ids = registry.size(),
            skipped = registry.skipped_rows(),
            "Loaded patient registry"
        );
        Ok(registry)
    }

    /// Parse registry rows from any reader.
    pub fn from_reader(reader: impl std::io::Read, config: &RegistryConfig) -> Result<Self> {
        let path = config.path.as_path();
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter_byte()?)
            .has_headers(config.has_header)
            .flexible(true)
            .from_reader(reader);

        let min_columns = 2.max(config.id_column + 1);
        let mut registry = Registry::new();

        for (index, result) in csv_reader.records().enumerate() {
            let row = index + 1;
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(load_error(path, e.to_string())),
                Err(e) => {
                    warn!(row, error = %e, "Skipping unreadable registry row");
                    registry.note_skipped();
                    continue;
                }
            };

            if record.len() < min_columns {
                warn!(
                    row,
                    columns = record.len(),
                    "Skipping registry row with too few columns"
                );
                registry.note_skipped();
                continue;
            }

            let id = &record[config.id_column];
            let linked = config.linked_column.and_then(|column| record.get(column));
            if !registry.insert(row, id, linked) {
                warn!(row, "Skipping registry row with blank patient ID");
                registry.note_skipped();
            }
        }

        Ok(registry)
    }
}

fn load_error(path: &Path, message: String) -> SieveError {
    SieveError::RegistryLoad {
        path: path.to_path_buf(),
        message,
    }
}

//! Run configuration, loadable from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::curation::{CurationLayout, MovePolicy};
use crate::error::{Result, SieveError};
use crate::metadata::ExtractionPolicy;
use crate::registry::RegistryConfig;

/// Where the ledger and its companion CSV go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
    /// CSV of matched moves (`timestamp,source,destination,patient_id,stage`).
    pub matched_csv: Option<PathBuf>,
    /// Echo ledger events to the console log.
    pub console: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("curation/ledger.log"),
            matched_csv: None,
            console: true,
        }
    }
}

/// Batch sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum files per run; absent or 0 means no limit.
    pub cap: Option<usize>,
    /// Worker threads; 1 runs sequentially.
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            cap: None,
            workers: 1,
        }
    }
}

/// Everything a curation run needs.
///
/// # Example
///
/// ```
/// use sieve::CurationConfig;
///
/// let config = CurationConfig::from_toml_str(r#"
///     reference_dir = "originals"
///
///     [registry]
///     path = "patients.csv"
///     id_column = 1
///
///     [batch]
///     cap = 500
/// "#).unwrap();
///
/// assert_eq!(config.batch.cap, Some(500));
/// assert_eq!(config.batch.workers, 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub layout: CurationLayout,
    /// Root of the non-anonymized reference population.
    pub reference_dir: Option<PathBuf>,
    pub registry: RegistryConfig,
    pub ledger: LedgerConfig,
    pub batch: BatchConfig,
    pub extraction: ExtractionPolicy,
    pub moves: MovePolicy,
    /// Modalities accepted by verification; empty accepts all.
    pub modalities: Vec<String>,
}

impl CurationConfig {
    /// Defaults with every state directory and the ledger under `root`.
    pub fn under_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            layout: CurationLayout::under(root),
            ledger: LedgerConfig {
                path: root.join("ledger.log"),
                ..LedgerConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SieveError::Config(e.to_string()))
    }

    /// Load a TOML file. Relative paths inside it are taken relative to the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SieveError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&text)
            .map_err(|e| SieveError::Config(format!("{}: {}", path.display(), e)))?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Resolve every relative path against `base`.
    pub fn rebase(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.layout.unexplored);
        fix(&mut self.layout.checking);
        fix(&mut self.layout.unsolvable);
        fix(&mut self.layout.dicom);
        fix(&mut self.registry.path);
        fix(&mut self.ledger.path);
        if let Some(p) = self.reference_dir.as_mut() {
            fix(p);
        }
        if let Some(p) = self.ledger.matched_csv.as_mut() {
            fix(p);
        }
    }

    /// Check bounds and layout sanity.
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.extraction.validate()?;
        self.moves.validate()?;

        if self.batch.workers == 0 || self.batch.workers > 64 {
            return Err(SieveError::Config(format!(
                "workers must be between 1 and 64, got {}",
                self.batch.workers
            )));
        }
        if let Some(reference) = &self.reference_dir {
            for state_dir in [&self.layout.unexplored, &self.layout.checking] {
                if reference.starts_with(state_dir) || state_dir.starts_with(reference) {
                    return Err(SieveError::Config(format!(
                        "reference directory '{}' overlaps curation directory '{}'",
                        reference.display(),
                        state_dir.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

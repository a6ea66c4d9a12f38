//! Error types for the sieve library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sieve operations.
///
/// `RegistryLoad` is fatal to a run. The extraction and move variants are
/// per-file: the batch runner records them and carries on with the next file.
#[derive(Debug, Error)]
pub enum SieveError {
    /// The patient registry could not be loaded.
    #[error("Failed to load registry '{path}': {message}")]
    RegistryLoad { path: PathBuf, message: String },

    /// Tags could not be read from a file.
    #[error("Metadata extraction failed for '{path}': {message}")]
    Extraction { path: PathBuf, message: String },

    /// No free destination name was found within the collision budget.
    #[error("Could not find a free destination name for '{path}' after {attempts} attempts")]
    MoveConflict { path: PathBuf, attempts: u32 },

    /// Moving a file failed; the source is left in place.
    #[error("Failed to move '{from}' to '{to}': {source}")]
    MoveIo {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error reading or accessing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The audit ledger could not be written or read.
    #[error("Ledger error for '{path}': {message}")]
    Ledger { path: PathBuf, message: String },
}

impl SieveError {
    /// Build an `Io` error for a path.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SieveError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SieveError::RegistryLoad { .. } | SieveError::Config(_))
    }

    /// Short stable label used in ledger records.
    pub fn kind(&self) -> &'static str {
        match self {
            SieveError::RegistryLoad { .. } => "registry_load",
            SieveError::Extraction { .. } => "extraction_failure",
            SieveError::MoveConflict { .. } => "move_conflict",
            SieveError::MoveIo { .. } => "move_io",
            SieveError::Io { .. } => "io",
            SieveError::Csv(_) => "csv",
            SieveError::Json(_) => "json",
            SieveError::Config(_) => "config",
            SieveError::Ledger { .. } => "ledger",
        }
    }
}

/// Result type alias for sieve operations.
pub type Result<T> = std::result::Result<T, SieveError>;

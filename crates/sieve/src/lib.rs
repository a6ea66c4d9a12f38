//! Sieve: registry-driven curation of DICOM file collections.
//!
//! Files enter an `unexplored` directory. Sieve reads each file's patient ID,
//! checks it against an approved-patient registry, cross-verifies it against
//! a non-anonymized reference population, and moves it through
//! `checking` to either `dicom` (accepted) or `unsolvable`. Every decision is
//! appended to an audit ledger.
//!
//! # Core Principles
//!
//! - **Location is state**: a file's directory is its curation state
//! - **Never overwrite**: name collisions get a fresh suffix, no file is lost
//! - **Full provenance**: every move, skip and failure lands in the ledger
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sieve::{
//!     BatchRunner, CurationConfig, CurationMachine, DicomExtractor, Ledger, Registry, Stage,
//! };
//!
//! let config = CurationConfig::load("sieve.toml").unwrap();
//! let registry = Registry::load(&config.registry).unwrap();
//! let machine = CurationMachine::new(
//!     config.layout.clone(),
//!     Arc::new(registry),
//!     Arc::new(DicomExtractor::new()),
//! );
//!
//! let runner = BatchRunner::new(machine, Ledger::open(&config.ledger.path).unwrap());
//! let summary = runner.run(Stage::Explore, Some(100)).unwrap();
//! println!("moved {} of {}", summary.moved, summary.processed);
//! ```

pub mod batch;
pub mod config;
pub mod curation;
pub mod error;
pub mod ledger;
mod lossy_path;
pub mod metadata;
pub mod registry;

pub use batch::{BatchRunner, FileScanner, RunSummary, Stage};
pub use config::{BatchConfig, CurationConfig, LedgerConfig};
pub use curation::{
    CollisionCounter, CurationLayout, CurationMachine, CurationState, Decision, FileMover,
    ManualMove, MatchResult, MovePolicy, ReferenceIndex,
};
pub use error::{Result, SieveError};
pub use ledger::{read_ledger, Ledger, LedgerEntry, LedgerEvent, LedgerSummary};
pub use metadata::{
    DicomExtractor, ExtractionPolicy, GuardedExtractor, ImagingTags, MetadataExtractor,
    MockExtractor,
};
pub use registry::{sanitize, Registry, RegistryConfig};

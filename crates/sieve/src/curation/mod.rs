//! Curation state machine: where a file stands and where it goes next.
//!
//! A file's state is the directory it sits in. Files only move forward:
//!
//! ```text
//! unexplored ──matched──▶ checking ──cross-verified──▶ dicom
//!                             │
//!                             └──anything else──▶ unsolvable
//! ```
//!
//! Unmatched or unreadable files in `unexplored` stay put. `restore` is the
//! one administrative path back to `unexplored`.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use sieve::{CurationLayout, CurationMachine, DicomExtractor, Registry, RegistryConfig};
//!
//! let registry = Registry::load(&RegistryConfig::default().with_path("patients.csv")).unwrap();
//! let machine = CurationMachine::new(
//!     CurationLayout::under("curation"),
//!     Arc::new(registry),
//!     Arc::new(DicomExtractor::new()),
//! );
//!
//! if let Some(decision) = machine.process("curation/unexplored/a.dcm".as_ref()).unwrap() {
//!     println!("{} -> {}", decision.from, decision.to);
//! }
//! ```

mod decision;
mod machine;
mod mover;
mod naming;
mod reference;
mod state;

pub use decision::{CollisionNote, Decision, ManualMove, MatchResult};
pub use machine::{cross_verify, CurationMachine, Verification};
pub use mover::{disambiguate, CollisionCounter, FileMover, MoveMethod, MovePolicy, MoveReceipt};
pub use naming::accepted_name;
pub use reference::{ReferenceFile, ReferenceIndex};
pub use state::{CurationLayout, CurationState};

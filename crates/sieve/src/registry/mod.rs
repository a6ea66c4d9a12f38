//! Patient registry: the authoritative list of approved anonymized IDs.
//!
//! Loaded once per run from a CSV and shared read-only by everything that
//! needs to answer "is this patient approved?".

mod loader;
mod sanitize;
mod table;

pub use loader::RegistryConfig;
pub use sanitize::{is_blank, sanitize};
pub use table::{DuplicateId, IdColumn, Registry, RegistryEntry};

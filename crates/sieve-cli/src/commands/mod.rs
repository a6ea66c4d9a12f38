//! CLI command implementations.

pub mod common;
pub mod duplicates;
pub mod restore;
pub mod stage;
pub mod status;

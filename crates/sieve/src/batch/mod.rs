//! Batch processing: discover eligible files and run the state machine over them.

mod runner;
mod scanner;

pub use runner::{BatchRunner, RunSummary, Stage};
pub use scanner::FileScanner;

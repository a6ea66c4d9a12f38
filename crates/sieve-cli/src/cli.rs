//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Sieve: registry-driven curation of DICOM file collections
#[derive(Parser)]
#[command(name = "sieve")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "SIEVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Curation root holding unexplored/, checking/, unsolvable/ and dicom/
    #[arg(long, global = true, env = "SIEVE_ROOT")]
    pub root: Option<PathBuf>,
}

/// Options shared by the batch stages.
#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Registry CSV of approved patients
    #[arg(short, long, env = "SIEVE_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Zero-based column holding the anonymized patient ID
    #[arg(long)]
    pub id_column: Option<usize>,

    /// Zero-based column holding the linked (non-anonymized) patient ID
    #[arg(long)]
    pub linked_column: Option<usize>,

    /// Maximum number of files to process (0 = no limit)
    #[arg(long)]
    pub cap: Option<usize>,

    /// Worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Ledger file
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Also write matched moves to this CSV
    #[arg(long)]
    pub matched_csv: Option<PathBuf>,

    /// Don't echo ledger events to the console
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match unexplored files against the registry and move hits to checking
    Explore {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Cross-verify checking files against the reference population
    Verify {
        #[command(flatten)]
        run: RunArgs,

        /// Root of the non-anonymized reference files
        #[arg(long, env = "SIEVE_REFERENCE")]
        reference: Option<PathBuf>,

        /// Only verify these modalities (e.g. MG,US); others stay in checking
        #[arg(long = "modality", value_delimiter = ',')]
        modalities: Vec<String>,
    },

    /// Move a file from checking, unsolvable or dicom back to unexplored
    Restore {
        /// File to restore
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Who is making the change
        #[arg(long, env = "USER")]
        operator: Option<String>,

        /// Ledger file
        #[arg(long)]
        ledger: Option<PathBuf>,
    },

    /// Report patient IDs that appear on more than one registry row
    Duplicates {
        /// Registry CSV
        #[arg(short, long, env = "SIEVE_REGISTRY")]
        registry: Option<PathBuf>,

        /// Zero-based column holding the anonymized patient ID
        #[arg(long)]
        id_column: Option<usize>,

        /// Zero-based column holding the linked patient ID
        #[arg(long)]
        linked_column: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show curation progress from the directories and the ledger
    Status {
        /// Ledger file
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

//! Sieve CLI - registry-driven DICOM curation.

mod cli;
mod commands;
mod logging;

use clap::Parser;
use cli::{Cli, Commands};
use sieve::Stage;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Explore { run } => commands::stage::run(
            Stage::Explore,
            run,
            None,
            Vec::new(),
            cli.config,
            cli.root,
        ),

        Commands::Verify {
            run,
            reference,
            modalities,
        } => commands::stage::run(
            Stage::Verify,
            run,
            reference,
            modalities,
            cli.config,
            cli.root,
        ),

        Commands::Restore {
            file,
            operator,
            ledger,
        } => commands::restore::run(file, operator, ledger, cli.config, cli.root),

        Commands::Duplicates {
            registry,
            id_column,
            linked_column,
            json,
        } => commands::duplicates::run(
            registry,
            id_column,
            linked_column,
            json,
            cli.config,
            cli.root,
        ),

        Commands::Status { ledger, json } => {
            commands::status::run(ledger, json, cli.config, cli.root)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

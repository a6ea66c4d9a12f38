//! Restore command - send a file back to unexplored.

use std::path::PathBuf;

use colored::Colorize;
use sieve::{LedgerEvent, Registry};

use super::common::{self, CliResult};

pub fn run(
    file: PathBuf,
    operator: Option<String>,
    ledger: Option<PathBuf>,
    config: Option<PathBuf>,
    root: Option<PathBuf>,
) -> CliResult {
    let mut config = common::load_config(config, root)?;
    if let Some(ledger) = ledger {
        config.ledger.path = ledger;
    }
    config.validate()?;

    if !file.is_file() {
        return Err(format!("File not found: {}", file.display()).into());
    }
    let file = std::path::absolute(&file)?;

    let machine = common::build_machine(&config, Registry::new(), false)?;
    let ledger = common::open_ledger(&config)?;

    let moved = machine.restore(&file, operator)?;
    println!(
        "{} {} ({} → {})",
        "Restored".green().bold(),
        moved.destination.display(),
        moved.from.to_string().yellow(),
        moved.to.to_string().cyan()
    );
    if let Some(collision) = &moved.collision {
        println!(
            "  {} '{}' was taken, renamed",
            "Note:".yellow(),
            collision.requested.display()
        );
    }

    ledger.record(LedgerEvent::Override(moved))?;
    Ok(())
}

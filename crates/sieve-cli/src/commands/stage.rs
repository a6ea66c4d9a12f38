//! Explore and verify commands - run one curation stage over a batch.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use colored::Colorize;
use sieve::{BatchRunner, Registry, RunSummary, Stage};

use super::common::{self, CliResult};
use crate::cli::RunArgs;

pub fn run(
    stage: Stage,
    args: RunArgs,
    reference: Option<PathBuf>,
    modalities: Vec<String>,
    config: Option<PathBuf>,
    root: Option<PathBuf>,
) -> CliResult {
    let mut config = common::load_config(config, root)?;
    common::apply_run_args(&mut config, &args);
    if let Some(reference) = reference {
        config.reference_dir = Some(reference);
    }
    if !modalities.is_empty() {
        config.modalities = modalities;
    }
    config.validate()?;

    let registry = Registry::load(&config.registry)?;
    let machine = common::build_machine(&config, registry, stage == Stage::Verify)?;
    let ledger = common::open_ledger(&config)?;
    let runner = BatchRunner::new(machine, ledger).with_workers(config.batch.workers);

    let cancel = runner.cancel_handle();
    ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    })
    .map_err(|e| format!("Failed to set Ctrl+C handler: {}", e))?;

    println!(
        "{} {} (registry: {} IDs)",
        "Running".cyan().bold(),
        stage.to_string().white().bold(),
        runner.machine().registry().size()
    );

    let summary = runner.run(stage, config.batch.cap)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "Summary:".yellow().bold());
    println!(
        "  Processed: {} of {}",
        summary.processed.to_string().white().bold(),
        summary.discovered
    );
    println!("  Matched:   {}", summary.matched.to_string().green());
    println!("  Unmatched: {}", summary.unmatched.to_string().yellow());
    println!(
        "  No ID:     {}",
        summary.extraction_failed.to_string().yellow()
    );
    println!("  Moved:     {}", summary.moved.to_string().cyan());
    if summary.unresolved > 0 {
        println!(
            "  Unresolved references: {}",
            summary.unresolved.to_string().magenta()
        );
    }
    if summary.vanished > 0 {
        println!("  Vanished:  {}", summary.vanished.to_string().dimmed());
    }
    if summary.errors > 0 {
        println!("  Errors:    {}", summary.errors.to_string().red());
    }
    println!(
        "  Duration:  {:.1}s",
        summary.duration().num_milliseconds() as f64 / 1000.0
    );

    println!();
    if summary.interrupted {
        println!(
            "  {} Interrupted; finished files stay where they are.",
            "⚠".yellow()
        );
    } else if summary.errors == 0 {
        println!("  {} Done", "✓".green());
    } else {
        println!(
            "  {} Done with errors; see the ledger for details",
            "⚠".yellow()
        );
    }
}

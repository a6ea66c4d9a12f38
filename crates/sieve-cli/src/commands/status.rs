//! Status command - show curation progress and ledger totals.

use std::path::PathBuf;

use colored::Colorize;
use sieve::{read_ledger, CurationState, FileScanner, LedgerSummary};

use super::common::{self, CliResult};

pub fn run(
    ledger: Option<PathBuf>,
    json_output: bool,
    config: Option<PathBuf>,
    root: Option<PathBuf>,
) -> CliResult {
    let mut config = common::load_config(config, root)?;
    if let Some(ledger) = ledger {
        config.ledger.path = ledger;
    }

    let scanner = FileScanner::new();
    let counts: Vec<(CurationState, usize)> = CurationState::ALL
        .into_iter()
        .map(|state| {
            let dir = config.layout.dir(state);
            let count = scanner.scan(dir).map(|files| files.len()).unwrap_or(0);
            (state, count)
        })
        .collect();

    let summary = if config.ledger.path.exists() {
        Some(LedgerSummary::from_records(&read_ledger(&config.ledger.path)?))
    } else {
        None
    };

    if json_output {
        let files: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(state, count)| (state.label().to_string(), (*count).into()))
            .collect();
        let status = serde_json::json!({
            "files": files,
            "ledger": config.ledger.path,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Curation status".cyan().bold());
    println!();

    let total: usize = counts.iter().map(|(_, count)| count).sum();
    println!("{}", "Files:".yellow().bold());
    for (state, count) in &counts {
        let shown = match state {
            CurationState::Unexplored => count.to_string().white(),
            CurationState::Checking => count.to_string().blue(),
            CurationState::Unsolvable => count.to_string().red(),
            CurationState::Dicom => count.to_string().green(),
        };
        println!("  {:<11} {}", format!("{}:", state.label()), shown);
    }

    if total > 0 {
        let done = counts
            .iter()
            .filter(|(state, _)| state.is_terminal())
            .map(|(_, count)| count)
            .sum::<usize>();
        let progress = done as f64 / total as f64;
        let bar_width = 30;
        let filled = (progress * bar_width as f64).round() as usize;
        let bar: String = "█".repeat(filled) + &"░".repeat(bar_width - filled);
        println!();
        println!(
            "Progress: {} {}/{} ({:.0}%)",
            bar.cyan(),
            done.to_string().white().bold(),
            total,
            progress * 100.0
        );
    }
    println!();

    let Some(summary) = summary else {
        println!(
            "  {} No ledger at {}",
            "Note:".yellow(),
            config.ledger.path.display()
        );
        return Ok(());
    };

    println!("{}", "Ledger:".yellow().bold());
    println!("  Runs:       {}", summary.runs);
    println!("  Decisions:  {}", summary.decisions);
    println!("  Moves:      {}", summary.moves.to_string().cyan());
    for (result, count) in &summary.by_result {
        println!("    {:<18} {}", format!("{}:", result), count);
    }
    if summary.overrides > 0 {
        println!("  Overrides:  {}", summary.overrides.to_string().magenta());
    }
    if summary.unresolved > 0 {
        println!("  Unresolved: {}", summary.unresolved.to_string().magenta());
    }
    if summary.errors > 0 {
        println!("  Errors:     {}", summary.errors.to_string().red());
        for (kind, count) in &summary.by_error {
            println!("    {:<18} {}", format!("{}:", kind), count);
        }
    }

    if let Some(last) = &summary.last_run {
        println!();
        println!(
            "Last run: {} at {} ({} processed, {} moved{})",
            last.stage.to_string().white().bold(),
            last.finished_at.format("%Y-%m-%d %H:%M:%S"),
            last.processed,
            last.moved,
            if last.interrupted { ", interrupted" } else { "" }
        );
    }
    Ok(())
}

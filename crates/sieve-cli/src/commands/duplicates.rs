//! Duplicates command - list IDs that repeat in the registry.

use std::path::PathBuf;

use colored::Colorize;
use sieve::Registry;

use super::common::{self, CliResult};

pub fn run(
    registry: Option<PathBuf>,
    id_column: Option<usize>,
    linked_column: Option<usize>,
    json_output: bool,
    config: Option<PathBuf>,
    root: Option<PathBuf>,
) -> CliResult {
    let mut config = common::load_config(config, root)?;
    if let Some(path) = registry {
        config.registry.path = path;
    }
    if let Some(column) = id_column {
        config.registry.id_column = column;
    }
    if let Some(column) = linked_column {
        config.registry.linked_column = Some(column);
    }

    let registry = Registry::load(&config.registry)?;
    let duplicates = registry.duplicates();

    if json_output {
        let report = serde_json::json!({
            "registry": config.registry.path,
            "unique_ids": registry.size(),
            "skipped_rows": registry.skipped_rows(),
            "duplicates": duplicates,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {} ({} unique IDs, {} rows skipped)",
        "Registry".cyan().bold(),
        config.registry.path.display(),
        registry.size().to_string().white().bold(),
        registry.skipped_rows()
    );
    println!();

    if duplicates.is_empty() {
        println!("  {} No repeated IDs", "✓".green());
        return Ok(());
    }

    println!("{}", "Repeated IDs:".yellow().bold());
    for duplicate in &duplicates {
        let rows: Vec<String> = duplicate.rows.iter().map(|r| r.to_string()).collect();
        println!(
            "  {} [{}] rows {}",
            duplicate.id.white(),
            duplicate.column.label().cyan(),
            rows.join(", ")
        );
    }
    println!();
    println!(
        "  {} repeated ID(s)",
        duplicates.len().to_string().yellow()
    );
    Ok(())
}

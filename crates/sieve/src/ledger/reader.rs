//! Reading the ledger back for status reports.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::batch::RunSummary;
use crate::curation::MatchResult;
use crate::error::{Result, SieveError};

use super::record::{LedgerEntry, LedgerEvent};

/// Parse every well-formed line of the ledger at `path`.
///
/// Malformed lines, such as one cut short by a crash, are skipped with a
/// warning.
pub fn read_ledger(path: impl AsRef<Path>) -> Result<Vec<LedgerEntry>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SieveError::Ledger {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| SieveError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match LedgerEntry::parse_line(&line) {
            Ok(entry) => entries.push(entry),
            Err(reason) => warn!(
                path = %path.display(),
                line = index + 1,
                reason = %reason,
                "Skipping malformed ledger line"
            ),
        }
    }
    Ok(entries)
}

/// Totals across a ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub runs: usize,
    pub decisions: usize,
    pub moves: usize,
    pub overrides: usize,
    pub errors: usize,
    pub unresolved: usize,
    /// Decisions per match result label.
    pub by_result: IndexMap<String, usize>,
    /// Moves per destination state.
    pub by_destination: IndexMap<String, usize>,
    /// Errors per error kind.
    pub by_error: IndexMap<String, usize>,
    /// Summary of the most recent finished run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunSummary>,
}

impl LedgerSummary {
    /// Aggregate `records`.
    pub fn from_records(records: &[LedgerEntry]) -> Self {
        let mut summary = Self::default();
        for result in [
            MatchResult::Matched,
            MatchResult::Unmatched,
            MatchResult::ExtractionFailed,
        ] {
            summary.by_result.insert(result.label().to_string(), 0);
        }

        for record in records {
            match &record.event {
                LedgerEvent::RunStarted { .. } => summary.runs += 1,
                LedgerEvent::Decision(decision) => {
                    summary.decisions += 1;
                    summary.unresolved += decision.unresolved.len();
                    *summary
                        .by_result
                        .entry(decision.match_result.label().to_string())
                        .or_default() += 1;
                    if decision.is_move() {
                        summary.moves += 1;
                        *summary
                            .by_destination
                            .entry(decision.to.label().to_string())
                            .or_default() += 1;
                    }
                }
                LedgerEvent::Error { kind, .. } => {
                    summary.errors += 1;
                    *summary.by_error.entry(kind.clone()).or_default() += 1;
                }
                LedgerEvent::Override(_) => summary.overrides += 1,
                LedgerEvent::RunFinished(run) => summary.last_run = Some(run.clone()),
            }
        }
        summary
    }
}

//! Ledger records and their line format.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{RunSummary, Stage};
use crate::curation::{Decision, ManualMove};
use crate::error::{Result, SieveError};

/// Something worth auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A batch run began.
    RunStarted {
        stage: Stage,
        #[serde(serialize_with = "crate::lossy_path::serialize")]
        source: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        cap: Option<usize>,
        /// Eligible files before the cap was applied.
        discovered: usize,
    },
    /// A file was evaluated.
    Decision(Decision),
    /// A file could not be processed.
    Error {
        #[serde(serialize_with = "crate::lossy_path::serialize")]
        file: PathBuf,
        kind: String,
        message: String,
    },
    /// A file was moved by hand outside the normal flow.
    Override(ManualMove),
    /// A batch run ended.
    RunFinished(RunSummary),
}

impl LedgerEvent {
    /// Error record for `file`.
    pub fn error(file: &Path, error: &SieveError) -> Self {
        LedgerEvent::Error {
            file: file.to_path_buf(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    /// One-line human summary for console output.
    pub fn describe(&self) -> String {
        match self {
            LedgerEvent::RunStarted {
                stage,
                source,
                discovered,
                ..
            } => format!(
                "{} run started: {} eligible files in {}",
                stage,
                discovered,
                source.display()
            ),
            LedgerEvent::Decision(decision) => match &decision.destination {
                Some(destination) => format!(
                    "{} [{}] {} -> {}",
                    decision.file.display(),
                    decision.match_result.label(),
                    decision.from,
                    destination.display()
                ),
                None => format!(
                    "{} [{}] stays in {}",
                    decision.file.display(),
                    decision.match_result.label(),
                    decision.from
                ),
            },
            LedgerEvent::Error { file, kind, message } => {
                format!("{} failed ({}): {}", file.display(), kind, message)
            }
            LedgerEvent::Override(moved) => format!(
                "{} restored from {} to {}",
                moved.file.display(),
                moved.from,
                moved.destination.display()
            ),
            LedgerEvent::RunFinished(summary) => format!(
                "{} run finished: {} processed, {} moved, {} errors",
                summary.stage, summary.processed, summary.moved, summary.errors
            ),
        }
    }
}

/// A timestamped ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub at: DateTime<Utc>,
    pub event: LedgerEvent,
}

impl LedgerEntry {
    /// Stamp `event` with the current time.
    pub fn now(event: LedgerEvent) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }

    /// `<RFC 3339 timestamp>\t<json>\n`
    pub fn to_line(&self) -> Result<String> {
        let json = serde_json::to_string(&self.event)?;
        Ok(format!(
            "{}\t{}\n",
            self.at.to_rfc3339_opts(SecondsFormat::Millis, true),
            json
        ))
    }

    /// Parse one line written by [`LedgerEntry::to_line`].
    pub fn parse_line(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (stamp, json) = line
            .split_once('\t')
            .ok_or_else(|| "missing tab separator".to_string())?;
        let at = DateTime::parse_from_rfc3339(stamp)
            .map_err(|e| format!("bad timestamp '{stamp}': {e}"))?
            .with_timezone(&Utc);
        let event = serde_json::from_str(json).map_err(|e| format!("bad record: {e}"))?;
        Ok(Self { at, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curation::{CurationState, MatchResult};

    #[test]
    fn test_line_shape() {
        let entry = LedgerEntry::now(LedgerEvent::Decision(
            Decision::stay(
                "u/a.dcm",
                CurationState::Unexplored,
                Some("P9".to_string()),
                MatchResult::Unmatched,
            )
            .with_reason("patient ID not in registry"),
        ));

        let line = entry.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let (stamp, json) = line.trim_end().split_once('\t').unwrap();
        assert!(stamp.ends_with('Z'));
        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["event"], "decision");
        assert_eq!(value["match_result"], "unmatched");
    }

    #[test]
    fn test_parse_line() {
        let entry = LedgerEntry::now(LedgerEvent::Error {
            file: PathBuf::from("u/bad.dcm"),
            kind: "move_io".to_string(),
            message: "disk full".to_string(),
        });
        let parsed = LedgerEntry::parse_line(&entry.to_line().unwrap()).unwrap();
        assert_eq!(parsed.event, entry.event);
    }

    #[test]
    fn test_parse_rejects_truncated_line() {
        assert!(LedgerEntry::parse_line("2024-01-01T00:00:00.000Z\t{\"event\":\"dec").is_err());
        assert!(LedgerEntry::parse_line("no tab here").is_err());
    }
}

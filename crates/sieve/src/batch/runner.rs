//! Batch runs over one curation stage.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::curation::{CurationMachine, CurationState, Decision, MatchResult};
use crate::error::{Result, SieveError};
use crate::ledger::{Ledger, LedgerEvent};

use super::scanner::FileScanner;

/// Which directory a run drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Match unexplored files against the registry.
    Explore,
    /// Cross-verify checking files against the reference population.
    Verify,
}

impl Stage {
    /// The state whose files this stage evaluates.
    pub fn source_state(&self) -> CurationState {
        match self {
            Stage::Explore => CurationState::Unexplored,
            Stage::Verify => CurationState::Checking,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Explore => "explore",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explore" | "explorer" => Ok(Stage::Explore),
            "verify" | "check" | "checker" => Ok(Stage::Verify),
            _ => Err(format!("Unknown stage: {}. Use explore or verify.", s)),
        }
    }
}

/// Counts for one run. Always produced, even when files failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stage: Stage,
    /// Eligible files found before the cap.
    pub discovered: usize,
    /// Files attempted.
    pub processed: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub extraction_failed: usize,
    pub moved: usize,
    /// Files evaluated and left where they were.
    pub skipped: usize,
    /// Reference candidates left for manual review.
    pub unresolved: usize,
    /// Files gone before they could be evaluated.
    pub vanished: usize,
    pub errors: usize,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    fn new(stage: Stage, discovered: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            stage,
            discovered,
            processed: 0,
            matched: 0,
            unmatched: 0,
            extraction_failed: 0,
            moved: 0,
            skipped: 0,
            unresolved: 0,
            vanished: 0,
            errors: 0,
            interrupted: false,
            started_at,
            finished_at: started_at,
        }
    }

    fn absorb(&mut self, outcome: &Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Decided(decision) => {
                match decision.match_result {
                    MatchResult::Matched => self.matched += 1,
                    MatchResult::Unmatched => self.unmatched += 1,
                    MatchResult::ExtractionFailed => self.extraction_failed += 1,
                }
                if decision.is_move() {
                    self.moved += 1;
                } else {
                    self.skipped += 1;
                }
                self.unresolved += decision.unresolved.len();
            }
            Outcome::Vanished => self.vanished += 1,
            Outcome::Failed => self.errors += 1,
        }
    }

    /// Wall-clock duration of the run.
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// What happened to one file.
enum Outcome {
    Decided(Decision),
    Vanished,
    Failed,
}

/// Drives the state machine over every eligible file of a stage.
pub struct BatchRunner {
    machine: Arc<CurationMachine>,
    ledger: Arc<Ledger>,
    scanner: FileScanner,
    workers: usize,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(machine: CurationMachine, ledger: Ledger) -> Self {
        Self {
            machine: Arc::new(machine),
            ledger: Arc::new(ledger),
            scanner: FileScanner::new(),
            workers: 1,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Process files on `workers` threads; 1 (the default) runs sequentially.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_scanner(mut self, scanner: FileScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Flag that stops the run before the next file once set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn machine(&self) -> &CurationMachine {
        &self.machine
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Evaluate up to `cap` eligible files of `stage` in lexical order.
    ///
    /// A cap of `None` or 0 means no limit. Per-file failures are counted and
    /// recorded; only configuration and ledger failures abort the run.
    pub fn run(&self, stage: Stage, cap: Option<usize>) -> Result<RunSummary> {
        let started_at = Utc::now();
        let layout = self.machine.layout();

        if stage == Stage::Verify && !self.machine.has_references() {
            return Err(SieveError::Config(
                "verify needs a reference directory".to_string(),
            ));
        }
        // Reference files carry real IDs; without the linked column none resolve.
        if stage == Stage::Verify && !self.machine.registry().has_linked_ids() {
            return Err(SieveError::Config(
                "verify needs a registry with a linked (non-anonymized) ID column".to_string(),
            ));
        }
        layout.validate()?;
        layout.ensure_dirs()?;

        let source_state = stage.source_state();
        let source = layout.dir(source_state);
        let mut files = self.scanner.scan(source)?;
        // Nested layouts: leave files that belong to a deeper state directory.
        files.retain(|path| layout.state_of(path) == Some(source_state));

        let discovered = files.len();
        let cap = cap.filter(|&cap| cap > 0);
        if let Some(cap) = cap {
            files.truncate(cap);
        }

        self.ledger.record(LedgerEvent::RunStarted {
            stage,
            source: source.to_path_buf(),
            cap,
            discovered,
        })?;
        info!(
            %stage,
            source = %source.display(),
            discovered,
            selected = files.len(),
            workers = self.workers,
            "Starting run"
        );

        let mut summary = RunSummary::new(stage, discovered, started_at);
        if self.workers > 1 {
            self.run_parallel(&files, &mut summary)?;
        } else {
            for path in &files {
                if self.cancelled() {
                    summary.interrupted = true;
                    break;
                }
                let outcome = self.handle(path)?;
                summary.absorb(&outcome);
            }
        }

        summary.finished_at = Utc::now();
        self.ledger
            .record(LedgerEvent::RunFinished(summary.clone()))?;
        info!(
            %stage,
            processed = summary.processed,
            moved = summary.moved,
            matched = summary.matched,
            unmatched = summary.unmatched,
            extraction_failed = summary.extraction_failed,
            errors = summary.errors,
            interrupted = summary.interrupted,
            "Run finished"
        );
        Ok(summary)
    }

    fn run_parallel(&self, files: &[std::path::PathBuf], summary: &mut RunSummary) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("sieve-worker-{i}"))
            .build()
            .map_err(|e| SieveError::Config(format!("could not start worker pool: {e}")))?;

        let outcomes: Vec<Option<Result<Outcome>>> = pool.install(|| {
            files
                .par_iter()
                .map(|path| (!self.cancelled()).then(|| self.handle(path)))
                .collect()
        });

        for outcome in outcomes {
            match outcome {
                Some(outcome) => summary.absorb(&outcome?),
                None => summary.interrupted = true,
            }
        }
        Ok(())
    }

    /// Process one file and record what happened. Errors returned from here
    /// abort the run.
    fn handle(&self, path: &Path) -> Result<Outcome> {
        match self.machine.process(path) {
            Ok(Some(decision)) => {
                match self.ledger.record(LedgerEvent::Decision(decision.clone())) {
                    Ok(()) => Ok(Outcome::Decided(decision)),
                    Err(e) => self.unrecorded(path, e),
                }
            }
            Ok(None) => Ok(Outcome::Vanished),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(file = %path.display(), error = %e, "Failed to process file");
                match self.ledger.record(LedgerEvent::error(path, &e)) {
                    Ok(()) => Ok(Outcome::Failed),
                    Err(e) => self.unrecorded(path, e),
                }
            }
        }
    }

    /// A record about one file could not be written. Encoding failures are
    /// confined to that file; a ledger that cannot be written at all ends the run.
    fn unrecorded(&self, path: &Path, e: SieveError) -> Result<Outcome> {
        match e {
            SieveError::Json(_) => {
                error!(file = %path.display(), error = %e, "Could not encode ledger record");
                Ok(Outcome::Failed)
            }
            e => Err(e),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

//! Append-only ledger sinks.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::curation::{Decision, MatchResult};
use crate::error::{Result, SieveError};

use super::record::{LedgerEntry, LedgerEvent};

const MATCHED_HEADER: [&str; 5] = ["timestamp", "source", "destination", "patient_id", "stage"];

/// Writes every audited event to the configured sinks.
///
/// Each event becomes one line appended with a single `write_all`; nothing
/// already written is ever rewritten. Safe to share between workers.
#[derive(Default)]
pub struct Ledger {
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
    matched: Option<(PathBuf, Mutex<csv::Writer<File>>)>,
    memory: Option<Mutex<Vec<LedgerEntry>>>,
    console: bool,
}

impl Ledger {
    /// Append to the ledger file at `path`, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SieveError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SieveError::io(path, e))?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(Mutex::new(file)),
            ..Self::default()
        })
    }

    /// A ledger with no durable sink; events only reach enabled sinks.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Keep every entry in memory, for inspection in tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            memory: Some(Mutex::new(Vec::new())),
            ..Self::default()
        }
    }

    /// Also append matched moves to a CSV at `path`.
    ///
    /// The header row is written only when the file is new or empty.
    pub fn with_matched_csv(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SieveError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SieveError::io(path, e))?;
        let is_new = file.metadata().map_err(|e| SieveError::io(path, e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(MATCHED_HEADER)?;
            writer.flush().map_err(|e| SieveError::io(path, e))?;
        }

        self.matched = Some((path.to_path_buf(), Mutex::new(writer)));
        Ok(self)
    }

    /// Echo every event through `tracing` at info level.
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Path of the durable ledger file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append `event` to every sink.
    pub fn record(&self, event: LedgerEvent) -> Result<()> {
        let entry = LedgerEntry::now(event);

        if self.console {
            info!(target: "sieve::ledger", "{}", entry.event.describe());
        }

        if let Some(file) = &self.file {
            let line = entry.to_line()?;
            let mut file = self.lock(file)?;
            file.write_all(line.as_bytes())
                .and_then(|()| file.flush())
                .map_err(|e| self.ledger_error(e.to_string()))?;
        }

        if let LedgerEvent::Decision(decision) = &entry.event {
            self.record_matched(&entry, decision)?;
        }

        if let Some(memory) = &self.memory {
            self.lock(memory)?.push(entry);
        }
        Ok(())
    }

    /// Entries kept by an in-memory ledger.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.memory
            .as_ref()
            .and_then(|memory| memory.lock().ok().map(|entries| entries.clone()))
            .unwrap_or_default()
    }

    fn record_matched(&self, entry: &LedgerEntry, decision: &Decision) -> Result<()> {
        let Some((path, writer)) = &self.matched else {
            return Ok(());
        };
        if decision.match_result != MatchResult::Matched {
            return Ok(());
        }
        let Some(destination) = &decision.destination else {
            return Ok(());
        };

        let timestamp = entry.at.to_rfc3339();
        let source = decision.file.to_string_lossy();
        let destination = destination.to_string_lossy();
        let patient_id = decision.patient_id.as_deref().unwrap_or_default();

        let mut writer = self.lock(writer)?;
        writer.write_record([
            timestamp.as_str(),
            &*source,
            &*destination,
            patient_id,
            decision.to.label(),
        ])?;
        writer.flush().map_err(|e| SieveError::io(path, e))?;
        Ok(())
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|_| self.ledger_error("ledger lock poisoned".to_string()))
    }

    fn ledger_error(&self, message: String) -> SieveError {
        SieveError::Ledger {
            path: self.path.clone().unwrap_or_default(),
            message,
        }
    }
}

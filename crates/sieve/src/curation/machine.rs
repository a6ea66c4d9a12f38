//! The per-file curation state machine.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Result, SieveError};
use crate::metadata::{ImagingTags, MetadataExtractor};
use crate::registry::Registry;

use super::decision::{Decision, ManualMove, MatchResult};
use super::mover::FileMover;
use super::naming::accepted_name;
use super::reference::{ReferenceFile, ReferenceIndex};
use super::state::{CurationLayout, CurationState};

/// Outcome of cross-verifying a checking file against the reference index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification<'a> {
    /// A reference file confirmed the identity.
    Confirmed {
        reference: &'a ReferenceFile,
        /// Other qualifying references, lexically ordered.
        unresolved: Vec<&'a ReferenceFile>,
    },
    /// No reference confirmed the identity.
    Rejected {
        match_result: MatchResult,
        reason: String,
    },
}

/// Decide whether `tags` are confirmed by a reference file.
///
/// A reference qualifies when its patient ID resolves to the same registry
/// entry as the checked file and its instance number, view position and
/// laterality all equal the checked file's. The lexically first qualifying
/// reference wins.
pub fn cross_verify<'a>(
    registry: &Registry,
    references: &'a ReferenceIndex,
    tags: &ImagingTags,
) -> Verification<'a> {
    let rejected = |match_result, reason: &str| Verification::Rejected {
        match_result,
        reason: reason.to_string(),
    };

    let Some(patient_id) = tags.patient_id() else {
        return rejected(MatchResult::ExtractionFailed, "no patient ID");
    };
    let Some(entry) = registry.resolve(patient_id) else {
        return rejected(MatchResult::Unmatched, "patient ID not in registry");
    };
    let Some(key) = tags.cross_key() else {
        return rejected(MatchResult::Unmatched, "missing cross-verification tags");
    };

    let mut qualifying = references.candidates(&key).filter(|candidate| {
        candidate
            .tags
            .patient_id()
            .and_then(|id| registry.resolve(id))
            .is_some_and(|other| other.id == entry.id)
    });

    match qualifying.next() {
        Some(reference) => Verification::Confirmed {
            reference,
            unresolved: qualifying.collect(),
        },
        None => rejected(MatchResult::Unmatched, "no matching reference file"),
    }
}

/// Evaluates one file at a time and moves it to its next state.
///
/// State is read from the file's directory, so evaluating a file that has
/// already moved on is a no-op.
pub struct CurationMachine {
    layout: CurationLayout,
    registry: Arc<Registry>,
    extractor: Arc<dyn MetadataExtractor>,
    references: Option<Arc<ReferenceIndex>>,
    mover: FileMover,
    modalities: Vec<String>,
}

impl CurationMachine {
    /// Create a machine without a reference index; checking files cannot be
    /// verified until one is attached.
    pub fn new(
        layout: CurationLayout,
        registry: Arc<Registry>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            layout,
            registry,
            extractor,
            references: None,
            mover: FileMover::default(),
            modalities: Vec::new(),
        }
    }

    /// Attach the reference index used to verify checking files.
    pub fn with_references(mut self, references: Arc<ReferenceIndex>) -> Self {
        self.references = Some(references);
        self
    }

    /// Only verify checking files of these modalities (e.g. `MG`, `US`);
    /// others stay in checking. Empty accepts every modality.
    pub fn with_modalities<I, S>(mut self, modalities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.modalities = modalities
            .into_iter()
            .map(|m| m.as_ref().trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        self
    }

    /// Use `mover` for all moves.
    pub fn with_mover(mut self, mover: FileMover) -> Self {
        self.mover = mover;
        self
    }

    pub fn layout(&self) -> &CurationLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn has_references(&self) -> bool {
        self.references.is_some()
    }

    /// Evaluate the file at `path`.
    ///
    /// Returns `Ok(None)` when the file no longer exists or is in a terminal
    /// state. Move failures are returned as errors with the file left in place.
    pub fn process(&self, path: &Path) -> Result<Option<Decision>> {
        if !path.is_file() {
            debug!(file = %path.display(), "File vanished before evaluation");
            return Ok(None);
        }

        match self.layout.state_of(path) {
            Some(CurationState::Unexplored) => self.explore(path).map(Some),
            Some(CurationState::Checking) => self.verify(path).map(Some),
            Some(state) => {
                debug!(file = %path.display(), %state, "File is in a terminal state");
                Ok(None)
            }
            None => Err(SieveError::io(
                path,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "file is outside the curation directories",
                ),
            )),
        }
    }

    fn explore(&self, path: &Path) -> Result<Decision> {
        let from = CurationState::Unexplored;

        let tags = match self.extractor.extract(path) {
            Ok(tags) => tags,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping file, extraction failed");
                return Ok(Decision::stay(path, from, None, MatchResult::ExtractionFailed)
                    .with_reason(e.to_string()));
            }
        };

        let Some(patient_id) = tags.patient_id.clone() else {
            warn!(file = %path.display(), "Skipping file, no patient ID");
            return Ok(
                Decision::stay(path, from, None, MatchResult::ExtractionFailed)
                    .with_reason("no patient ID"),
            );
        };

        if !self.registry.contains(&patient_id) {
            info!(file = %path.display(), patient_id = %patient_id, "Patient ID not in registry");
            return Ok(
                Decision::stay(path, from, Some(patient_id), MatchResult::Unmatched)
                    .with_reason("patient ID not in registry"),
            );
        }

        let decision = Decision::advance(
            path,
            from,
            CurationState::Checking,
            Some(patient_id),
            MatchResult::Matched,
        );
        self.carry_out(decision, file_name(path)?)
    }

    fn verify(&self, path: &Path) -> Result<Decision> {
        let from = CurationState::Checking;
        let references = self.references.as_deref().ok_or_else(|| {
            SieveError::Config("checking files requires a reference directory".to_string())
        })?;

        let tags = match self.extractor.extract(path) {
            Ok(tags) => tags,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Extraction failed in checking");
                let decision = Decision::advance(
                    path,
                    from,
                    CurationState::Unsolvable,
                    None,
                    MatchResult::ExtractionFailed,
                )
                .with_reason(e.to_string());
                return self.carry_out(decision, file_name(path)?);
            }
        };

        if !self.accepts_modality(&tags) {
            let modality = tags.modality.as_deref().unwrap_or("none");
            info!(file = %path.display(), modality, "Skipping unsupported modality");
            return Ok(Decision::stay(
                path,
                from,
                tags.patient_id.clone(),
                MatchResult::Unmatched,
            )
            .with_reason(format!("unsupported modality '{modality}'")));
        }

        let name = file_name(path)?;
        match cross_verify(&self.registry, references, &tags) {
            Verification::Rejected {
                match_result,
                reason,
            } => {
                info!(file = %path.display(), reason = %reason, "Cross-verification failed");
                let decision = Decision::advance(
                    path,
                    from,
                    CurationState::Unsolvable,
                    tags.patient_id.clone(),
                    match_result,
                )
                .with_reason(reason);
                self.carry_out(decision, name)
            }
            Verification::Confirmed {
                reference,
                unresolved,
            } => {
                let unresolved: Vec<PathBuf> = unresolved.into_iter().map(|r| r.path.clone()).collect();
                if !unresolved.is_empty() {
                    warn!(
                        file = %path.display(),
                        selected = %reference.path.display(),
                        others = unresolved.len(),
                        "Several reference files qualify, using the first"
                    );
                }

                let renamed = match (
                    reference.tags.view_position.as_deref(),
                    reference.tags.laterality.as_deref(),
                ) {
                    (Some(view), Some(laterality)) => accepted_name(name, view, laterality),
                    _ => None,
                };
                let target = renamed.unwrap_or_else(|| {
                    warn!(file = %path.display(), "File name does not follow the naming pattern, keeping it");
                    name.to_string()
                });

                let decision = Decision::advance(
                    path,
                    from,
                    CurationState::Dicom,
                    tags.patient_id.clone(),
                    MatchResult::Matched,
                )
                .with_reference(reference.path.clone())
                .with_unresolved(unresolved);
                self.carry_out(decision, &target)
            }
        }
    }

    fn accepts_modality(&self, tags: &ImagingTags) -> bool {
        self.modalities.is_empty()
            || tags.modality.as_deref().is_some_and(|modality| {
                self.modalities
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(modality.trim()))
            })
    }

    fn carry_out(&self, decision: Decision, target_name: &str) -> Result<Decision> {
        debug_assert!(decision.from.can_advance_to(decision.to));
        let dir = self.layout.dir(decision.to);
        let receipt = self.mover.move_into(&decision.file, dir, target_name)?;
        info!(
            from = %decision.file.display(),
            to = %receipt.destination.display(),
            state = %decision.to,
            "Moved file"
        );
        Ok(decision.moved_to(receipt.destination, receipt.collision))
    }

    /// Move a file from any later state back to unexplored.
    pub fn restore(&self, path: &Path, operator: Option<String>) -> Result<ManualMove> {
        let from = match self.layout.state_of(path) {
            Some(CurationState::Unexplored) => {
                return Err(SieveError::Config(format!(
                    "'{}' is already unexplored",
                    path.display()
                )));
            }
            Some(state) => state,
            None => {
                return Err(SieveError::Config(format!(
                    "'{}' is outside the curation directories",
                    path.display()
                )));
            }
        };

        let to = CurationState::Unexplored;
        let receipt = self
            .mover
            .move_into(path, self.layout.dir(to), file_name(path)?)?;
        info!(
            from = %path.display(),
            to = %receipt.destination.display(),
            "Restored file to unexplored"
        );

        Ok(ManualMove {
            file: path.to_path_buf(),
            from,
            to,
            destination: receipt.destination,
            collision: receipt.collision,
            operator,
            moved_at: Utc::now(),
        })
    }
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        SieveError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "file name is not valid UTF-8"),
        )
    })
}

//! Per-file curation decisions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::CurationState;

/// Outcome of checking a file's identity against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    /// Patient ID approved (and cross-verified, in the checking stage).
    Matched,
    /// Patient ID present but not approved, or cross-verification failed.
    Unmatched,
    /// No patient ID could be read.
    ExtractionFailed,
}

impl MatchResult {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MatchResult::Matched => "Matched",
            MatchResult::Unmatched => "Unmatched",
            MatchResult::ExtractionFailed => "Extraction failed",
        }
    }
}

/// How a name collision at the destination was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionNote {
    /// The name that was already taken.
    #[serde(serialize_with = "crate::lossy_path::serialize")]
    pub requested: PathBuf,
    /// Counter values tried before a free name was found.
    pub attempts: u32,
}

/// The result of evaluating one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Where the file was when evaluated.
    #[serde(serialize_with = "crate::lossy_path::serialize")]
    pub file: PathBuf,

    /// Patient ID as extracted, before sanitization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,

    pub match_result: MatchResult,

    /// State the file was in.
    pub from: CurationState,

    /// State the file is in afterwards.
    pub to: CurationState,

    /// New location, when the file moved.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::lossy_path::option::serialize"
    )]
    pub destination: Option<PathBuf>,

    /// Reference file that confirmed the match (checking stage).
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::lossy_path::option::serialize"
    )]
    pub reference: Option<PathBuf>,

    /// Other qualifying reference files left for manual review.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "crate::lossy_path::many::serialize"
    )]
    pub unresolved: Vec<PathBuf>,

    /// Set when the destination name was taken and a new one derived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collision: Option<CollisionNote>,

    /// Why the file went where it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub decided_at: DateTime<Utc>,
}

impl Decision {
    /// A decision that leaves the file where it is.
    pub fn stay(
        file: impl Into<PathBuf>,
        state: CurationState,
        patient_id: Option<String>,
        match_result: MatchResult,
    ) -> Self {
        Self {
            file: file.into(),
            patient_id,
            match_result,
            from: state,
            to: state,
            destination: None,
            reference: None,
            unresolved: Vec::new(),
            collision: None,
            reason: None,
            decided_at: Utc::now(),
        }
    }

    /// A decision that moves the file to `to`; the destination is filled in
    /// once the move has happened.
    pub fn advance(
        file: impl Into<PathBuf>,
        from: CurationState,
        to: CurationState,
        patient_id: Option<String>,
        match_result: MatchResult,
    ) -> Self {
        Self {
            to,
            ..Self::stay(file, from, patient_id, match_result)
        }
    }

    /// Set the reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the confirming reference file.
    pub fn with_reference(mut self, reference: impl Into<PathBuf>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Set the unresolved reference candidates.
    pub fn with_unresolved(mut self, unresolved: Vec<PathBuf>) -> Self {
        self.unresolved = unresolved;
        self
    }

    /// Record where the file ended up.
    pub fn moved_to(mut self, destination: PathBuf, collision: Option<CollisionNote>) -> Self {
        self.destination = Some(destination);
        self.collision = collision;
        self
    }

    /// Check if the file changed state.
    pub fn is_move(&self) -> bool {
        self.from != self.to
    }

    /// File name of the evaluated file.
    pub fn file_name(&self) -> Option<&str> {
        self.file.file_name().and_then(|n| n.to_str())
    }

    /// Current location of the file.
    pub fn current_path(&self) -> &Path {
        self.destination.as_deref().unwrap_or(&self.file)
    }
}

/// An administrative move outside the normal flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualMove {
    #[serde(serialize_with = "crate::lossy_path::serialize")]
    pub file: PathBuf,
    pub from: CurationState,
    pub to: CurationState,
    #[serde(serialize_with = "crate::lossy_path::serialize")]
    pub destination: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collision: Option<CollisionNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub moved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stay_decision() {
        let dec = Decision::stay(
            "/c/unexplored/a.dcm",
            CurationState::Unexplored,
            None,
            MatchResult::ExtractionFailed,
        );

        assert!(!dec.is_move());
        assert_eq!(dec.file_name(), Some("a.dcm"));
        assert_eq!(dec.current_path(), Path::new("/c/unexplored/a.dcm"));
    }

    #[test]
    fn test_advance_decision() {
        let dec = Decision::advance(
            "/c/unexplored/a.dcm",
            CurationState::Unexplored,
            CurationState::Checking,
            Some("P001".to_string()),
            MatchResult::Matched,
        )
        .moved_to(PathBuf::from("/c/checking/a.dcm"), None);

        assert!(dec.is_move());
        assert_eq!(dec.current_path(), Path::new("/c/checking/a.dcm"));
    }

    #[test]
    fn test_serializes_snake_case() {
        let dec = Decision::stay(
            "a.dcm",
            CurationState::Checking,
            Some("P1".to_string()),
            MatchResult::ExtractionFailed,
        )
        .with_reason("no patient ID");

        let json = serde_json::to_value(&dec).unwrap();
        assert_eq!(json["match_result"], "extraction_failed");
        assert_eq!(json["from"], "checking");
        assert!(json.get("destination").is_none());
    }
}

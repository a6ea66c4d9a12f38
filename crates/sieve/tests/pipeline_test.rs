//! End-to-end tests for the curation pipeline.
//!
//! Each test builds a throwaway curation tree in a temp directory and drives
//! it with a `MockExtractor`, so no real DICOM files are needed.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use sieve::{
    read_ledger, BatchRunner, CurationLayout, CurationMachine, CurationState, ExtractionPolicy,
    FileScanner, GuardedExtractor, ImagingTags, Ledger, LedgerEvent, LedgerSummary, MatchResult,
    MetadataExtractor, MockExtractor, MovePolicy, ReferenceIndex, Registry, RegistryConfig,
    SieveError, Stage,
};

struct Workspace {
    tmp: TempDir,
    layout: CurationLayout,
}

impl Workspace {
    fn new() -> Self {
        let tmp = TempDir::new().expect("Failed to create temp dir");
        let layout = CurationLayout::under(tmp.path().join("curation"));
        layout.ensure_dirs().unwrap();
        Self { tmp, layout }
    }

    fn put(&self, state: CurationState, name: &str) -> PathBuf {
        let path = self.layout.dir(state).join(name);
        fs::write(&path, format!("content of {name}")).unwrap();
        path
    }

    fn put_reference(&self, name: &str) -> PathBuf {
        let dir = self.references();
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        path
    }

    fn references(&self) -> PathBuf {
        self.tmp.path().join("originals")
    }

    fn ledger_path(&self) -> PathBuf {
        self.tmp.path().join("ledger.log")
    }

    fn registry(&self, content: &str, linked: Option<usize>) -> Registry {
        let path = self.tmp.path().join("registry.csv");
        fs::write(&path, content).unwrap();
        let mut config = RegistryConfig::default().with_path(&path);
        config.linked_column = linked;
        Registry::load(&config).expect("Registry load failed")
    }

    fn names(&self, state: CurationState) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.layout.dir(state))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn explorer(&self, registry: Registry, extractor: MockExtractor) -> BatchRunner {
        let machine = CurationMachine::new(
            self.layout.clone(),
            Arc::new(registry),
            Arc::new(extractor),
        );
        BatchRunner::new(machine, Ledger::open(self.ledger_path()).unwrap())
    }

    fn verifier(&self, registry: Registry, extractor: MockExtractor) -> BatchRunner {
        let extractor: Arc<dyn MetadataExtractor> = Arc::new(extractor);
        let index =
            ReferenceIndex::build(&self.references(), extractor.as_ref(), &FileScanner::new())
                .unwrap();
        let machine = CurationMachine::new(self.layout.clone(), Arc::new(registry), extractor)
            .with_references(Arc::new(index));
        BatchRunner::new(machine, Ledger::open(self.ledger_path()).unwrap())
    }
}

fn mammo(patient: &str, view: &str, laterality: &str) -> ImagingTags {
    ImagingTags::new()
        .with_patient_id(patient)
        .with_instance_number("1")
        .with_view_position(view)
        .with_laterality(laterality)
}

// =============================================================================
// Explore stage
// =============================================================================

#[test]
fn test_padded_id_matches_and_moves() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient,note\n,P001,\nx,p001,y\n", None);
    assert_eq!(registry.size(), 1);

    let file = ws.put(CurationState::Unexplored, "scan.dcm");
    let runner = ws.explorer(registry, MockExtractor::new().with_patient("scan.dcm", " P001 "));

    let summary = runner.run(Stage::Explore, None).unwrap();

    assert_eq!(summary.matched, 1);
    assert_eq!(summary.moved, 1);
    assert!(!file.exists());
    assert_eq!(ws.names(CurationState::Checking), vec!["scan.dcm"]);
    assert!(ws.names(CurationState::Unexplored).is_empty());
}

#[test]
fn test_rerun_makes_no_moves() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    ws.put(CurationState::Unexplored, "a.dcm");
    ws.put(CurationState::Unexplored, "b.dcm");
    ws.put(CurationState::Unexplored, "c.dcm");

    let extractor = MockExtractor::new()
        .with_patient("a.dcm", "P001")
        .with_patient("b.dcm", "P404");
    let runner = ws.explorer(registry, extractor);

    let first = runner.run(Stage::Explore, None).unwrap();
    assert_eq!(first.moved, 1);

    let second = runner.run(Stage::Explore, None).unwrap();
    assert_eq!(second.processed, 2);
    assert_eq!(second.moved, 0);
    assert_eq!(ws.names(CurationState::Unexplored), vec!["b.dcm", "c.dcm"]);
}

#[test]
fn test_collision_keeps_both_files() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    let existing = ws.put(CurationState::Checking, "a.dcm");
    ws.put(CurationState::Unexplored, "a.dcm");

    let runner = ws.explorer(registry, MockExtractor::new().with_patient("a.dcm", "P001"));
    let summary = runner.run(Stage::Explore, None).unwrap();

    assert_eq!(summary.moved, 1);
    assert_eq!(ws.names(CurationState::Checking), vec!["a.dcm", "a__1.dcm"]);
    assert_eq!(
        fs::read_to_string(&existing).unwrap(),
        "content of a.dcm"
    );

    let entries = read_ledger(ws.ledger_path()).unwrap();
    let collision = entries.iter().find_map(|entry| match &entry.event {
        LedgerEvent::Decision(decision) => decision.collision.clone(),
        _ => None,
    });
    assert_eq!(
        collision.map(|c| c.requested),
        Some(ws.layout.checking.join("a.dcm"))
    );
}

#[test]
fn test_malformed_file_does_not_halt_batch() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    ws.put(CurationState::Unexplored, "a_corrupt.dcm");
    ws.put(CurationState::Unexplored, "b.dcm");
    ws.put(CurationState::Unexplored, "c.dcm");

    let extractor = MockExtractor::new()
        .with_failure("a_corrupt.dcm", "not a DICOM file")
        .with_patient("b.dcm", "P001")
        .with_patient("c.dcm", "P001");
    let runner = ws.explorer(registry, extractor);

    let summary = runner.run(Stage::Explore, None).unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.extraction_failed, 1);
    assert_eq!(summary.moved, 2);
    assert_eq!(ws.names(CurationState::Unexplored), vec!["a_corrupt.dcm"]);
}

#[test]
fn test_cap_limits_processed_files() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    let mut extractor = MockExtractor::new();
    for i in 1..=5 {
        let name = format!("f{i}.dcm");
        ws.put(CurationState::Unexplored, &name);
        extractor = extractor.with_patient(name, "P001");
    }

    let runner = ws.explorer(registry, extractor);
    let summary = runner.run(Stage::Explore, Some(3)).unwrap();

    assert_eq!(summary.discovered, 5);
    assert_eq!(summary.processed, 3);
    assert_eq!(ws.names(CurationState::Checking), vec!["f1.dcm", "f2.dcm", "f3.dcm"]);
    assert_eq!(ws.names(CurationState::Unexplored), vec!["f4.dcm", "f5.dcm"]);
}

#[test]
fn test_zero_cap_is_unbounded() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    ws.put(CurationState::Unexplored, "a.dcm");
    ws.put(CurationState::Unexplored, "b.dcm");

    let runner = ws.explorer(registry, MockExtractor::new());
    let summary = runner.run(Stage::Explore, Some(0)).unwrap();
    assert_eq!(summary.processed, 2);
}

#[test]
fn test_system_files_ignored() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    ws.put(CurationState::Unexplored, ".DS_Store");
    ws.put(CurationState::Unexplored, "DICOMDIR");
    ws.put(CurationState::Unexplored, "a.dcm");

    let runner = ws.explorer(registry, MockExtractor::new().with_patient("a.dcm", "P001"));
    let summary = runner.run(Stage::Explore, None).unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(ws.names(CurationState::Unexplored), vec![".DS_Store", "DICOMDIR"]);
}

#[test]
fn test_slow_extraction_times_out_without_blocking() {
    let ws = Workspace::new();
    let registry = Arc::new(ws.registry("row,patient\n1,P001\n", None));
    ws.put(CurationState::Unexplored, "a_slow.dcm");
    ws.put(CurationState::Unexplored, "b.dcm");

    let mock = MockExtractor::new()
        .with_delay(
            "a_slow.dcm",
            Duration::from_millis(400),
            ImagingTags::new().with_patient_id("P001"),
        )
        .with_patient("b.dcm", "P001");
    let guarded = GuardedExtractor::new(
        Arc::new(mock),
        ExtractionPolicy {
            timeout_ms: 25,
            attempts: 1,
            ..ExtractionPolicy::default()
        },
    );

    let machine = CurationMachine::new(ws.layout.clone(), registry, Arc::new(guarded));
    let runner = BatchRunner::new(machine, Ledger::in_memory());
    let summary = runner.run(Stage::Explore, None).unwrap();

    assert_eq!(summary.extraction_failed, 1);
    assert_eq!(summary.moved, 1);
    assert_eq!(ws.names(CurationState::Checking), vec!["b.dcm"]);
}

#[cfg(target_os = "linux")]
#[test]
fn test_undecodable_file_names_do_not_halt_batch() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    let matched = ws.layout.unexplored.join(OsStr::from_bytes(b"a\xff.dcm"));
    let unreadable = ws.layout.unexplored.join(OsStr::from_bytes(b"c\xff.dcm"));
    fs::write(&matched, "a").unwrap();
    fs::write(&unreadable, "c").unwrap();
    ws.put(CurationState::Unexplored, "b.dcm");

    let extractor = MockExtractor::new()
        .with_patient("a\u{fffd}.dcm", "P001")
        .with_patient("b.dcm", "P001");
    let summary = ws
        .explorer(registry, extractor)
        .run(Stage::Explore, None)
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.extraction_failed, 1);
    assert_eq!(summary.moved, 1);
    assert!(matched.exists() && unreadable.exists());
    assert_eq!(ws.names(CurationState::Checking), vec!["b.dcm"]);

    let entries = read_ledger(ws.ledger_path()).unwrap();
    assert!(matches!(
        entries.last().unwrap().event,
        LedgerEvent::RunFinished(_)
    ));
    let failed = entries
        .iter()
        .find_map(|entry| match &entry.event {
            LedgerEvent::Error { file, kind, .. } => Some((file.clone(), kind.clone())),
            _ => None,
        })
        .unwrap();
    assert_eq!(failed.0, ws.layout.unexplored.join("a\u{fffd}.dcm"));
    assert_eq!(failed.1, "io");
}

// =============================================================================
// Verify stage
// =============================================================================

#[test]
fn test_lexically_first_reference_wins() {
    let ws = Workspace::new();
    let registry = ws.registry("row,anon,real\n1,A1,N1\n", Some(2));
    ws.put(CurationState::Checking, "A1_MG_XX_X.dcm");
    let first = ws.put_reference("ref_a.dcm");
    let second = ws.put_reference("ref_b.dcm");

    let extractor = MockExtractor::new()
        .with_tags("A1_MG_XX_X.dcm", mammo("A1", "cc", "L"))
        .with_tags("ref_b.dcm", mammo("N1", "Cc", "l"))
        .with_tags("ref_a.dcm", mammo("N1", "CC", "L"));
    let runner = ws.verifier(registry, extractor);

    let summary = runner.run(Stage::Verify, None).unwrap();

    assert_eq!(summary.matched, 1);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(ws.names(CurationState::Dicom), vec!["A1_MG_CC_L.dcm"]);
    assert!(first.exists() && second.exists());

    let decision = read_ledger(ws.ledger_path())
        .unwrap()
        .into_iter()
        .find_map(|entry| match entry.event {
            LedgerEvent::Decision(decision) => Some(decision),
            _ => None,
        })
        .unwrap();
    assert_eq!(decision.reference, Some(first));
    assert_eq!(decision.unresolved, vec![second]);
}

#[test]
fn test_mismatch_goes_to_unsolvable() {
    let ws = Workspace::new();
    let registry = ws.registry("row,anon,real\n1,A1,N1\n2,A2,N2\n", Some(2));
    ws.put(CurationState::Checking, "wrong_view.dcm");
    ws.put(CurationState::Checking, "wrong_patient.dcm");
    ws.put(CurationState::Checking, "no_id.dcm");
    ws.put_reference("ref.dcm");

    let extractor = MockExtractor::new()
        .with_tags("wrong_view.dcm", mammo("A1", "MLO", "L"))
        .with_tags("wrong_patient.dcm", mammo("A2", "CC", "L"))
        .with_tags("ref.dcm", mammo("N1", "CC", "L"));
    let runner = ws.verifier(registry, extractor);

    let summary = runner.run(Stage::Verify, None).unwrap();

    assert_eq!(summary.moved, 3);
    assert_eq!(summary.matched, 0);
    assert_eq!(summary.extraction_failed, 1);
    assert!(ws.names(CurationState::Checking).is_empty());
    assert_eq!(
        ws.names(CurationState::Unsolvable),
        vec!["no_id.dcm", "wrong_patient.dcm", "wrong_view.dcm"]
    );
}

#[test]
fn test_name_without_pattern_is_kept() {
    let ws = Workspace::new();
    let registry = ws.registry("row,anon,real\n1,A1,N1\n", Some(2));
    ws.put(CurationState::Checking, "scan.dcm");
    ws.put_reference("ref.dcm");

    let extractor = MockExtractor::new()
        .with_tags("scan.dcm", mammo("A1", "CC", "R"))
        .with_tags("ref.dcm", mammo("N1", "CC", "R"));
    ws.verifier(registry, extractor)
        .run(Stage::Verify, None)
        .unwrap();

    assert_eq!(ws.names(CurationState::Dicom), vec!["scan.dcm"]);
}

#[test]
fn test_verify_needs_linked_ids() {
    let ws = Workspace::new();
    let registry_csv = "real_patient_id,anonymized_patient_id\nN1,A1\n";
    ws.put(CurationState::Checking, "A1_MG_XX_X.dcm");
    ws.put_reference("ref.dcm");

    let tags = || {
        MockExtractor::new()
            .with_tags("A1_MG_XX_X.dcm", mammo("A1", "CC", "L"))
            .with_tags("ref.dcm", mammo("N1", "CC", "L"))
    };

    let err = ws
        .verifier(ws.registry(registry_csv, None), tags())
        .run(Stage::Verify, None)
        .unwrap_err();
    assert!(matches!(err, SieveError::Config(_)));
    assert_eq!(ws.names(CurationState::Checking), vec!["A1_MG_XX_X.dcm"]);
    assert!(ws.names(CurationState::Unsolvable).is_empty());

    // The real ID sits in the first column of this layout.
    let summary = ws
        .verifier(ws.registry(registry_csv, Some(0)), tags())
        .run(Stage::Verify, None)
        .unwrap();
    assert_eq!(summary.matched, 1);
    assert_eq!(ws.names(CurationState::Dicom), vec!["A1_MG_CC_L.dcm"]);
}

#[test]
fn test_failed_move_is_retried_and_recorded() {
    let ws = Workspace::new();
    let registry = ws.registry("row,anon,real\n1,A1,N1\n2,A2,N2\n", Some(2));
    let stuck = ws.put(CurationState::Checking, "A1_MG_XX_X.dcm");
    ws.put(CurationState::Checking, "A2_MG_XX_X.dcm");
    ws.put_reference("ref1.dcm");
    ws.put_reference("ref2.dcm");

    // The accepted name for A1 exceeds the file name limit, so every
    // placement attempt fails.
    let long_view = "V".repeat(300);
    let extractor = MockExtractor::new()
        .with_tags("A1_MG_XX_X.dcm", mammo("A1", &long_view, "L"))
        .with_tags("ref1.dcm", mammo("N1", &long_view, "L"))
        .with_tags("A2_MG_XX_X.dcm", mammo("A2", "CC", "R"))
        .with_tags("ref2.dcm", mammo("N2", "CC", "R"));
    let runner = ws.verifier(registry, extractor);

    let started = Instant::now();
    let summary = runner.run(Stage::Verify, None).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.moved, 1);
    assert!(stuck.exists());
    assert_eq!(
        fs::read_to_string(&stuck).unwrap(),
        "content of A1_MG_XX_X.dcm"
    );
    assert_eq!(ws.names(CurationState::Dicom), vec!["A2_MG_CC_R.dcm"]);

    // Two pauses between three attempts.
    let policy = MovePolicy::default();
    assert_eq!(policy.attempts, 3);
    assert!(elapsed >= Duration::from_millis(policy.backoff_ms * (1 + 2)));

    let entries = read_ledger(ws.ledger_path()).unwrap();
    let failed: Vec<_> = entries
        .iter()
        .filter_map(|entry| match &entry.event {
            LedgerEvent::Error { file, kind, .. } => Some((file.clone(), kind.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![(stuck, "move_io".to_string())]);
}

#[test]
fn test_full_pipeline_ledger() {
    let ws = Workspace::new();
    let registry_csv = "row,anon,real\n1,A1,N1\n";
    ws.put(CurationState::Unexplored, "A1_MG_XX_X.dcm");
    ws.put_reference("ref.dcm");

    let tags = || {
        MockExtractor::new()
            .with_tags("A1_MG_XX_X.dcm", mammo("A1", "MLO", "R"))
            .with_tags("ref.dcm", mammo("N1", "MLO", "R"))
    };

    ws.explorer(ws.registry(registry_csv, Some(2)), tags())
        .run(Stage::Explore, None)
        .unwrap();
    ws.verifier(ws.registry(registry_csv, Some(2)), tags())
        .run(Stage::Verify, None)
        .unwrap();

    assert_eq!(ws.names(CurationState::Dicom), vec!["A1_MG_MLO_R.dcm"]);

    let content = fs::read_to_string(ws.ledger_path()).unwrap();
    assert!(content.lines().all(|line| line.split_once('\t').is_some()));

    let entries = read_ledger(ws.ledger_path()).unwrap();
    assert_eq!(entries.len(), content.lines().count());
    assert!(matches!(entries[0].event, LedgerEvent::RunStarted { .. }));
    assert!(matches!(
        entries.last().unwrap().event,
        LedgerEvent::RunFinished(_)
    ));

    let summary = LedgerSummary::from_records(&entries);
    assert_eq!(summary.runs, 2);
    assert_eq!(summary.moves, 2);
    assert_eq!(summary.by_destination.get("dicom"), Some(&1));
    assert_eq!(
        summary.by_result.get(MatchResult::Matched.label()),
        Some(&2)
    );
}

// =============================================================================
// Manual override
// =============================================================================

#[test]
fn test_restore_then_rerun() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    let file = ws.put(CurationState::Unsolvable, "a.dcm");

    let machine = CurationMachine::new(
        ws.layout.clone(),
        Arc::new(registry),
        Arc::new(MockExtractor::new().with_patient("a.dcm", "P001")),
    );
    let moved = machine.restore(&file, Some("qa".to_string())).unwrap();
    assert_eq!(moved.destination, ws.layout.unexplored.join("a.dcm"));

    let ledger = Ledger::open(ws.ledger_path()).unwrap();
    ledger.record(LedgerEvent::Override(moved)).unwrap();

    let runner = BatchRunner::new(machine, ledger);
    let summary = runner.run(Stage::Explore, None).unwrap();
    assert_eq!(summary.moved, 1);

    let entries = read_ledger(ws.ledger_path()).unwrap();
    assert_eq!(LedgerSummary::from_records(&entries).overrides, 1);
}

#[test]
fn test_ledger_has_one_line_per_event() {
    let ws = Workspace::new();
    let registry = ws.registry("row,patient\n1,P001\n", None);
    ws.put(CurationState::Unexplored, "a.dcm");
    ws.put(CurationState::Unexplored, "b.dcm");

    ws.explorer(registry, MockExtractor::new().with_patient("a.dcm", "P001"))
        .run(Stage::Explore, None)
        .unwrap();

    let content = fs::read_to_string(ws.ledger_path()).unwrap();
    // run_started, two decisions, run_finished
    assert_eq!(content.lines().count(), 4);
    assert!(content.ends_with('\n'));
}

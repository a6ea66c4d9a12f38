//! Shared setup for commands: configuration, machine and ledger.

use std::path::PathBuf;
use std::sync::Arc;

use sieve::{
    CollisionCounter, CurationConfig, CurationLayout, CurationMachine, DicomExtractor, FileMover,
    FileScanner, GuardedExtractor, Ledger, MetadataExtractor, ReferenceIndex, Registry,
};

use crate::cli::RunArgs;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Configuration from `--config`, else defaults under `--root`, else defaults.
///
/// `--root` given together with `--config` replaces the configured layout.
pub fn load_config(
    config: Option<PathBuf>,
    root: Option<PathBuf>,
) -> sieve::Result<CurationConfig> {
    let mut loaded = match (&config, &root) {
        (Some(path), _) => CurationConfig::load(path)?,
        (None, Some(root)) => CurationConfig::under_root(root),
        (None, None) => CurationConfig::default(),
    };
    if let (Some(_), Some(root)) = (&config, &root) {
        loaded.layout = CurationLayout::under(root);
    }
    Ok(loaded)
}

/// Apply command-line overrides on top of the file configuration.
pub fn apply_run_args(config: &mut CurationConfig, args: &RunArgs) {
    if let Some(registry) = &args.registry {
        config.registry.path = registry.clone();
    }
    if let Some(column) = args.id_column {
        config.registry.id_column = column;
    }
    if let Some(column) = args.linked_column {
        config.registry.linked_column = Some(column);
    }
    if let Some(cap) = args.cap {
        config.batch.cap = Some(cap);
    }
    if let Some(workers) = args.workers {
        config.batch.workers = workers;
    }
    if let Some(ledger) = &args.ledger {
        config.ledger.path = ledger.clone();
    }
    if let Some(csv) = &args.matched_csv {
        config.ledger.matched_csv = Some(csv.clone());
    }
    if args.quiet {
        config.ledger.console = false;
    }
}

/// The production extractor: DICOM decoding behind a timeout and retries.
pub fn extractor(config: &CurationConfig) -> Arc<dyn MetadataExtractor> {
    Arc::new(GuardedExtractor::new(
        Arc::new(DicomExtractor::new()),
        config.extraction.clone(),
    ))
}

/// Build the state machine. The reference index is only built when asked for.
pub fn build_machine(
    config: &CurationConfig,
    registry: Registry,
    with_references: bool,
) -> sieve::Result<CurationMachine> {
    let extractor = extractor(config);
    let mover = FileMover::new(Arc::new(CollisionCounter::new()), config.moves.clone());

    if with_references && !registry.has_linked_ids() {
        return Err(sieve::SieveError::Config(
            "verify needs the registry's linked (non-anonymized) ID column (--linked-column)"
                .to_string(),
        ));
    }

    let mut machine = CurationMachine::new(config.layout.clone(), Arc::new(registry), extractor.clone())
        .with_mover(mover)
        .with_modalities(&config.modalities);

    if with_references {
        let root = config.reference_dir.as_ref().ok_or_else(|| {
            sieve::SieveError::Config(
                "verify needs a reference directory (--reference or reference_dir)".to_string(),
            )
        })?;
        let index = ReferenceIndex::build(root, extractor.as_ref(), &FileScanner::new())?;
        machine = machine.with_references(Arc::new(index));
    }
    Ok(machine)
}

/// Open the ledger with every configured sink.
pub fn open_ledger(config: &CurationConfig) -> sieve::Result<Ledger> {
    let mut ledger = Ledger::open(&config.ledger.path)?.with_console(config.ledger.console);
    if let Some(csv) = &config.ledger.matched_csv {
        ledger = ledger.with_matched_csv(csv)?;
    }
    Ok(ledger)
}

//! Timeout and bounded retry around any extractor.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SieveError};

use super::extractor::{ImagingTags, MetadataExtractor};

/// Upper bound on extraction attempts per file.
pub const MAX_EXTRACTION_ATTEMPTS: u32 = 3;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// How long to wait for one extraction and how often to try.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionPolicy {
    /// Per-attempt timeout in milliseconds; 0 runs the call inline with no timeout.
    pub timeout_ms: u64,
    /// Attempts before giving up, 1 to [`MAX_EXTRACTION_ATTEMPTS`].
    pub attempts: u32,
    /// Timed-out calls that may still be running before new attempts fail
    /// without starting a thread.
    pub max_stalled: usize,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            attempts: 2,
            max_stalled: 8,
        }
    }
}

impl ExtractionPolicy {
    /// Per-attempt timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Check the attempt bound.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_EXTRACTION_ATTEMPTS).contains(&self.attempts) {
            return Err(SieveError::Config(format!(
                "extraction attempts must be between 1 and {}, got {}",
                MAX_EXTRACTION_ATTEMPTS, self.attempts
            )));
        }
        if self.max_stalled == 0 {
            return Err(SieveError::Config(
                "extraction max_stalled must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Wraps an extractor so no single file can hang or fail a batch.
///
/// Each attempt runs on a helper thread; an attempt that outlives the
/// timeout is abandoned. After the last failed attempt the file is reported
/// as an extraction failure.
///
/// Abandoned threads cannot be killed and keep running until the inner
/// extractor returns. Once `max_stalled` of them are outstanding, attempts
/// fail immediately until some finish.
pub struct GuardedExtractor {
    inner: Arc<dyn MetadataExtractor>,
    policy: ExtractionPolicy,
    stalled: Arc<AtomicUsize>,
}

impl GuardedExtractor {
    /// Guard `inner` with `policy`.
    pub fn new(inner: Arc<dyn MetadataExtractor>, policy: ExtractionPolicy) -> Self {
        Self {
            inner,
            policy,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Timed-out calls still running in the background.
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    fn attempt(&self, path: &Path) -> std::result::Result<ImagingTags, String> {
        let Some(timeout) = self.policy.timeout() else {
            return self.inner.extract(path).map_err(|e| e.to_string());
        };

        let stalled = self.stalled();
        if stalled >= self.policy.max_stalled {
            return Err(format!(
                "{stalled} timed-out extractions are still running, not starting another"
            ));
        }

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let owned = path.to_path_buf();
        let state = Arc::new(AtomicU8::new(RUNNING));
        let thread_state = Arc::clone(&state);
        let thread_stalled = Arc::clone(&self.stalled);
        thread::Builder::new()
            .name("sieve-extract".to_string())
            .spawn(move || {
                let result = inner.extract(&owned);
                if thread_state.swap(FINISHED, Ordering::SeqCst) == ABANDONED {
                    thread_stalled.fetch_sub(1, Ordering::SeqCst);
                }
                let _ = tx.send(result);
            })
            .map_err(|e| format!("could not start extraction thread: {e}"))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(RecvTimeoutError::Timeout) => {
                // Count first so the thread's decrement can never run ahead.
                self.stalled.fetch_add(1, Ordering::SeqCst);
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    self.stalled.fetch_sub(1, Ordering::SeqCst);
                }
                Err(format!("timed out after {timeout:?}"))
            }
            Err(RecvTimeoutError::Disconnected) => Err("extractor panicked".to_string()),
        }
    }
}

impl MetadataExtractor for GuardedExtractor {
    fn extract(&self, path: &Path) -> Result<ImagingTags> {
        let attempts = self.policy.attempts.clamp(1, MAX_EXTRACTION_ATTEMPTS);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(path) {
                Ok(tags) => return Ok(tags),
                Err(message) => {
                    warn!(
                        file = %path.display(),
                        attempt,
                        attempts,
                        extractor = self.inner.name(),
                        error = %message,
                        "Metadata extraction attempt failed"
                    );
                    last_error = message;
                }
            }
        }

        Err(SieveError::Extraction {
            path: path.to_path_buf(),
            message: format!("{last_error} (after {attempts} attempts)"),
        })
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MockExtractor;

    #[test]
    fn test_retries_then_fails() {
        let mock = Arc::new(MockExtractor::new().with_failure("bad.dcm", "corrupt"));
        let guarded = GuardedExtractor::new(
            mock.clone(),
            ExtractionPolicy {
                timeout_ms: 0,
                attempts: 3,
                ..ExtractionPolicy::default()
            },
        );

        let err = guarded.extract(Path::new("bad.dcm")).unwrap_err();
        assert!(matches!(err, SieveError::Extraction { .. }));
        assert_eq!(mock.calls(), 3);
    }

    #[test]
    fn test_timeout_becomes_extraction_failure() {
        let mock = Arc::new(MockExtractor::new().with_delay(
            "slow.dcm",
            Duration::from_millis(500),
            ImagingTags::new().with_patient_id("P001"),
        ));
        let guarded = GuardedExtractor::new(
            mock,
            ExtractionPolicy {
                timeout_ms: 20,
                attempts: 1,
                ..ExtractionPolicy::default()
            },
        );

        let err = guarded.extract(Path::new("slow.dcm")).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_stalled_threads_are_capped() {
        let mock = Arc::new(
            MockExtractor::new()
                .with_delay(
                    "slow.dcm",
                    Duration::from_millis(150),
                    ImagingTags::new().with_patient_id("P001"),
                )
                .with_patient("fast.dcm", "P002"),
        );
        let guarded = GuardedExtractor::new(
            mock.clone(),
            ExtractionPolicy {
                timeout_ms: 10,
                attempts: 1,
                max_stalled: 1,
            },
        );

        assert!(guarded.extract(Path::new("slow.dcm")).is_err());
        assert_eq!(guarded.stalled(), 1);

        let err = guarded.extract(Path::new("fast.dcm")).unwrap_err();
        assert!(err.to_string().contains("still running"));
        assert_eq!(mock.calls(), 1);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while guarded.stalled() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(guarded.stalled(), 0);

        let tags = guarded.extract(Path::new("fast.dcm")).unwrap();
        assert_eq!(tags.patient_id(), Some("P002"));
    }

    #[test]
    fn test_success_passes_through() {
        let mock = Arc::new(MockExtractor::new().with_patient("a.dcm", "P001"));
        let guarded = GuardedExtractor::new(mock, ExtractionPolicy::default());
        let tags = guarded.extract(Path::new("a.dcm")).unwrap();
        assert_eq!(tags.patient_id(), Some("P001"));
    }

    #[test]
    fn test_policy_bounds() {
        let policy = ExtractionPolicy {
            attempts: 4,
            ..ExtractionPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(ExtractionPolicy::default().validate().is_ok());

        let no_stall_budget = ExtractionPolicy {
            max_stalled: 0,
            ..ExtractionPolicy::default()
        };
        assert!(no_stall_budget.validate().is_err());
    }
}

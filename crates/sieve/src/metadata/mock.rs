//! Mock extractor for testing and dry runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Result, SieveError};

use super::extractor::{ImagingTags, MetadataExtractor};

/// Canned response for one file name.
#[derive(Debug, Clone)]
enum MockResponse {
    Tags(ImagingTags),
    Fail(String),
    Slow(Duration, ImagingTags),
}

/// Extractor that answers from a table keyed by file name.
///
/// Files without an entry come back with no tags at all, which the state
/// machine treats as a missing patient ID.
#[derive(Debug, Default)]
pub struct MockExtractor {
    responses: HashMap<String, MockResponse>,
    calls: AtomicUsize,
}

impl MockExtractor {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `file_name` with `tags`.
    pub fn with_tags(mut self, file_name: impl Into<String>, tags: ImagingTags) -> Self {
        self.responses
            .insert(file_name.into(), MockResponse::Tags(tags));
        self
    }

    /// Answer `file_name` with only a patient ID.
    pub fn with_patient(self, file_name: impl Into<String>, patient_id: &str) -> Self {
        self.with_tags(file_name, ImagingTags::new().with_patient_id(patient_id))
    }

    /// Fail extraction for `file_name`.
    pub fn with_failure(mut self, file_name: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .insert(file_name.into(), MockResponse::Fail(message.into()));
        self
    }

    /// Sleep for `delay` before answering `file_name`.
    pub fn with_delay(
        mut self,
        file_name: impl Into<String>,
        delay: Duration,
        tags: ImagingTags,
    ) -> Self {
        self.responses
            .insert(file_name.into(), MockResponse::Slow(delay, tags));
        self
    }

    /// Number of `extract` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataExtractor for MockExtractor {
    fn extract(&self, path: &Path) -> Result<ImagingTags> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self.responses.get(&file_name) {
            Some(MockResponse::Tags(tags)) => Ok(tags.clone()),
            Some(MockResponse::Fail(message)) => Err(SieveError::Extraction {
                path: path.to_path_buf(),
                message: message.clone(),
            }),
            Some(MockResponse::Slow(delay, tags)) => {
                std::thread::sleep(*delay);
                Ok(tags.clone())
            }
            None => Ok(ImagingTags::default()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_by_file_name() {
        let mock = MockExtractor::new().with_patient("a.dcm", "P001");

        let tags = mock.extract(Path::new("/any/dir/a.dcm")).unwrap();
        assert_eq!(tags.patient_id(), Some("P001"));

        let unknown = mock.extract(Path::new("b.dcm")).unwrap();
        assert_eq!(unknown.patient_id(), None);
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn test_failure() {
        let mock = MockExtractor::new().with_failure("bad.dcm", "not DICOM");
        assert!(matches!(
            mock.extract(Path::new("bad.dcm")),
            Err(SieveError::Extraction { .. })
        ));
    }
}

//! Metadata extraction: the boundary with DICOM decoding.
//!
//! The rest of the crate only sees [`MetadataExtractor`] and [`ImagingTags`].
//! [`DicomExtractor`] reads real files, [`MockExtractor`] answers from a table,
//! and [`GuardedExtractor`] adds a timeout and bounded retries to either.

mod dicom;
mod extractor;
mod guarded;
mod mock;

pub use dicom::DicomExtractor;
pub use extractor::{CrossKey, ImagingTags, MetadataExtractor};
pub use guarded::{ExtractionPolicy, GuardedExtractor, MAX_EXTRACTION_ATTEMPTS};
pub use mock::MockExtractor;

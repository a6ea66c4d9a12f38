//! DICOM Part 10 adapter over `dicom-object`.

use std::path::Path;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{DefaultDicomObject, OpenFileOptions};

use crate::error::{Result, SieveError};

use super::extractor::{clean, ImagingTags, MetadataExtractor};

/// Reads tags from DICOM files, stopping before pixel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomExtractor;

impl DicomExtractor {
    /// Create a new DICOM extractor.
    pub fn new() -> Self {
        Self
    }
}

impl MetadataExtractor for DicomExtractor {
    fn extract(&self, path: &Path) -> Result<ImagingTags> {
        let object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
            .map_err(|e| SieveError::Extraction {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(ImagingTags {
            patient_id: text(&object, tags::PATIENT_ID),
            instance_number: text(&object, tags::INSTANCE_NUMBER),
            view_position: text(&object, tags::VIEW_POSITION),
            laterality: text(&object, tags::IMAGE_LATERALITY),
            sop_instance_uid: text(&object, tags::SOP_INSTANCE_UID),
            modality: text(&object, tags::MODALITY),
        })
    }

    fn name(&self) -> &str {
        "dicom"
    }
}

fn text(object: &DefaultDicomObject, tag: Tag) -> Option<String> {
    let element = object.element(tag).ok()?;
    let value = element.to_str().ok()?;
    clean(&value)
}

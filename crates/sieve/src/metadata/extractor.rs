//! Extractor trait and the tag bag it returns.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Identity and auxiliary tags pulled from one imaging file.
///
/// Every field is optional: an absent or blank tag is `None`, never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagingTags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub laterality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sop_instance_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
}

impl ImagingTags {
    /// Create an empty tag bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the patient ID.
    pub fn with_patient_id(mut self, value: impl AsRef<str>) -> Self {
        self.patient_id = clean(value.as_ref());
        self
    }

    /// Set the instance number.
    pub fn with_instance_number(mut self, value: impl AsRef<str>) -> Self {
        self.instance_number = clean(value.as_ref());
        self
    }

    /// Set the view position.
    pub fn with_view_position(mut self, value: impl AsRef<str>) -> Self {
        self.view_position = clean(value.as_ref());
        self
    }

    /// Set the image laterality.
    pub fn with_laterality(mut self, value: impl AsRef<str>) -> Self {
        self.laterality = clean(value.as_ref());
        self
    }

    /// Set the SOP instance UID.
    pub fn with_sop_instance_uid(mut self, value: impl AsRef<str>) -> Self {
        self.sop_instance_uid = clean(value.as_ref());
        self
    }

    /// Set the modality.
    pub fn with_modality(mut self, value: impl AsRef<str>) -> Self {
        self.modality = clean(value.as_ref());
        self
    }

    /// The patient ID, if one was found.
    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    /// The cross-verification key, when all three fields are present.
    pub fn cross_key(&self) -> Option<CrossKey> {
        Some(CrossKey::new(
            self.instance_number.as_deref()?,
            self.view_position.as_deref()?,
            self.laterality.as_deref()?,
        ))
    }
}

/// InstanceNumber, ViewPosition and ImageLaterality, normalized for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossKey {
    pub instance_number: String,
    pub view_position: String,
    pub laterality: String,
}

impl CrossKey {
    /// Build a key; values are trimmed and uppercased.
    pub fn new(instance_number: &str, view_position: &str, laterality: &str) -> Self {
        Self {
            instance_number: instance_number.trim().to_uppercase(),
            view_position: view_position.trim().to_uppercase(),
            laterality: laterality.trim().to_uppercase(),
        }
    }
}

/// Turn a raw tag value into `Some` only when it carries text.
///
/// DICOM pads odd-length values with spaces or NULs; both are stripped.
pub(crate) fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads identity tags from imaging files.
///
/// Implementations return `Ok` with empty fields when a tag is absent and
/// `Err(SieveError::Extraction)` only when the file itself cannot be read.
pub trait MetadataExtractor: Send + Sync {
    /// Read the tags of one file.
    fn extract(&self, path: &Path) -> Result<ImagingTags>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

//! Part classification per ingest mode.

use stow_core::media_type::{APPLICATION_DICOM, APPLICATION_DICOM_JSON, APPLICATION_DICOM_XML};
use stow_core::{AttributeTree, MediaType};

/// What a request's root parts carry, taken from the `type` parameter of
/// the request's `multipart/related` content type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// Complete Part 10 objects (`application/dicom`).
    Dicom,
    /// Native DICOM Model documents (`application/dicom+xml`).
    MetadataXml,
    /// DICOM JSON documents (`application/dicom+json`).
    MetadataJson,
}

/// How one part of the request is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartKind {
    /// A complete object, stored directly from the part stream.
    Instance,
    /// A metadata document yielding candidate objects.
    Metadata,
    /// A payload referenced from a metadata document.
    BulkData,
    /// A part the current mode cannot handle.
    Unexpected,
}

impl InputMode {
    /// Select the mode from the `type` parameter, ignoring its own parameters.
    pub fn from_type_param(value: &str) -> Option<Self> {
        let media_type = MediaType::parse(value).ok()?;
        [Self::Dicom, Self::MetadataXml, Self::MetadataJson]
            .into_iter()
            .find(|mode| media_type.is(mode.media_type()))
    }

    /// Media type of the root parts.
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Dicom => APPLICATION_DICOM,
            Self::MetadataXml => APPLICATION_DICOM_XML,
            Self::MetadataJson => APPLICATION_DICOM_JSON,
        }
    }

    /// Short name used in logs and metrics labels.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dicom => "dicom",
            Self::MetadataXml => "xml",
            Self::MetadataJson => "json",
        }
    }

    pub fn classify(self, part_type: &MediaType) -> PartKind {
        let is_root = part_type.is(self.media_type());
        match (self, is_root) {
            (Self::Dicom, true) => PartKind::Instance,
            (Self::Dicom, false) => PartKind::Unexpected,
            (_, true) => PartKind::Metadata,
            (_, false) => PartKind::BulkData,
        }
    }

    /// Parse a metadata document into candidate objects. An XML document
    /// holds one object; a JSON document holds one object or an array.
    pub fn read_metadata(self, document: &[u8]) -> stow_core::Result<Vec<AttributeTree>> {
        match self {
            Self::Dicom => Ok(Vec::new()),
            Self::MetadataXml => Ok(vec![stow_core::xml::read_dataset(document)?]),
            Self::MetadataJson => stow_core::json::read_datasets(document),
        }
    }
}

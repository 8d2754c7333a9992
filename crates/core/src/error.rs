//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    #[error("invalid value representation: {0}")]
    InvalidVr(String),

    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("invalid UID: {0}")]
    InvalidUid(String),

    #[error("malformed DICOM JSON: {0}")]
    Json(String),

    #[error("malformed DICOM XML: {0}")]
    Xml(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error came from parsing a client supplied metadata document.
    pub fn is_malformed_document(&self) -> bool {
        matches!(
            self,
            Self::Json(_) | Self::Xml(_) | Self::InvalidTag(_) | Self::InvalidVr(_)
        )
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

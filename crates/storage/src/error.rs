//! Storage error types.

use crate::traits::StoredInstance;
use stow_core::status;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source stream failed: {0}")]
    Stream(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Rejection of a single instance by the persistence backend.
///
/// `code` is the failure reason reported for the instance in the
/// Failed SOP Sequence. `instance` is set once the identity of the rejected
/// instance is known.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    pub code: u16,
    pub message: String,
    pub instance: Option<StoredInstance>,
    #[source]
    pub source: Option<StorageError>,
}

impl StoreError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            instance: None,
            source: None,
        }
    }

    pub fn duplicate(instance: &StoredInstance) -> Self {
        Self::new(
            status::DUPLICATE_SOP_INSTANCE,
            format!("Instance {} already exists", instance.sop_instance_uid),
        )
        .with_instance(instance.clone())
    }

    pub fn with_instance(mut self, instance: StoredInstance) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Whether reading the request body failed while the instance was being
    /// received. Such failures abort the whole request.
    pub fn is_stream_failure(&self) -> bool {
        matches!(self.source, Some(StorageError::Stream(_)))
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        Self {
            code: status::PROCESSING_FAILURE,
            message: err.to_string(),
            instance: None,
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err).into()
    }
}

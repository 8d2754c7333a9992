//! Storage trait definitions.

use crate::error::{StorageResult, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use stow_core::AttributeTree;
use uuid::Uuid;

/// A boxed stream of bytes, as received from a request part.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Per-request information handed to the persistence backend.
#[derive(Clone, Debug)]
pub struct StoreContext {
    /// Title of the receiving application entity.
    pub aet: String,
    /// Correlates log lines of one request.
    pub request_id: Uuid,
}

impl StoreContext {
    pub fn new(aet: impl Into<String>) -> Self {
        Self {
            aet: aet.into(),
            request_id: Uuid::new_v4(),
        }
    }
}

/// A data set that passed completion and validation.
#[derive(Clone, Debug)]
pub struct CompletedInstance {
    pub attributes: AttributeTree,
    /// Transfer syntax in which the bulk data was received.
    pub transfer_syntax_uid: String,
}

/// Identity of a persisted instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredInstance {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
}

/// Persistence backend for received instances.
///
/// Each call stores exactly one instance; a rejection of one instance never
/// affects the others of the same request.
#[async_trait]
pub trait InstanceStore: Send + Sync + 'static {
    /// Persist a completed data set together with its resolved bulk data.
    async fn store_dataset(
        &self,
        ctx: &StoreContext,
        instance: &CompletedInstance,
    ) -> Result<StoredInstance, StoreError>;

    /// Persist a complete DICOM Part 10 object read from `stream`.
    async fn store_stream(
        &self,
        ctx: &StoreContext,
        stream: ByteStream,
    ) -> Result<StoredInstance, StoreError>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and properly configured.
    ///
    /// Called at startup and by the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

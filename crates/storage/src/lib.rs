//! Bulk data spooling and instance persistence for the STOW ingest service.
//!
//! This crate provides:
//! - The request-scoped bulk data spool
//! - The `InstanceStore` persistence trait
//! - Backends: local filesystem

pub mod backends;
pub mod error;
pub mod spool;
pub mod traits;

pub use backends::filesystem::FilesystemInstanceStore;
pub use error::{StorageError, StorageResult, StoreError};
pub use spool::BulkDataStore;
pub use traits::{ByteStream, CompletedInstance, InstanceStore, StoreContext, StoredInstance};

use std::sync::Arc;
use stow_core::config::StorageConfig;

/// Create an instance store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn InstanceStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemInstanceStore::new(path).await?;
            Ok(Arc::new(backend))
        }
    }
}

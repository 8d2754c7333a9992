//! Request-scoped bulk data spool.
//!
//! Bulk data parts of a metadata request are written to files in a private
//! directory below the configured spool root and looked up later by their
//! `Content-Location`. The directory is created on the first spooled part
//! and removed, together with every file in it, when the store is purged or
//! dropped.

use crate::error::{StorageError, StorageResult};
use crate::traits::ByteStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stow_core::{MediaType, SpooledPayload};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Spool of bulk data parts keyed by content location.
#[derive(Debug)]
pub struct BulkDataStore {
    root: PathBuf,
    directory: Option<PathBuf>,
    entries: HashMap<String, SpooledPayload>,
    files: Vec<PathBuf>,
    purged: bool,
}

impl BulkDataStore {
    /// Create an empty spool below `root`. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            directory: None,
            entries: HashMap::new(),
            files: Vec::new(),
            purged: false,
        }
    }

    /// The request's spool directory, once created.
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a spooled part by its content location.
    pub fn get(&self, location: &str) -> Option<&SpooledPayload> {
        self.entries.get(location)
    }

    /// Write a part to the spool and register it under `location`.
    ///
    /// A later part with the same location replaces the earlier entry.
    /// Returns the number of bytes written.
    pub async fn spool(
        &mut self,
        location: &str,
        media_type: MediaType,
        mut stream: ByteStream,
    ) -> StorageResult<u64> {
        if self.purged {
            return Err(StorageError::InvalidPath(
                "spool directory already purged".to_string(),
            ));
        }
        let directory = self.ensure_directory().await?;
        let path = directory.join(format!("{:04}.blk", self.files.len() + 1));
        self.files.push(path.clone());

        let mut file = fs::File::create(&path).await?;
        let mut length = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            length += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(
            location,
            media_type = %media_type,
            path = %path.display(),
            length,
            "Spooled bulk data"
        );
        self.entries.insert(
            location.to_string(),
            SpooledPayload {
                path,
                media_type,
                length,
            },
        );
        Ok(length)
    }

    async fn ensure_directory(&mut self) -> StorageResult<PathBuf> {
        if let Some(directory) = &self.directory {
            return Ok(directory.clone());
        }
        fs::create_dir_all(&self.root).await?;
        let directory = self.root.join(Uuid::new_v4().to_string());
        fs::create_dir(&directory).await?;
        self.directory = Some(directory.clone());
        Ok(directory)
    }

    /// Remove every spooled file and the spool directory.
    ///
    /// Runs at most once; later calls (including the one from `Drop`) do
    /// nothing. Failures are logged and otherwise ignored.
    pub fn purge(&mut self) {
        if self.purged {
            return;
        }
        self.purged = true;
        self.entries.clear();

        let Some(directory) = self.directory.take() else {
            return;
        };
        tracing::debug!(directory = %directory.display(), "Purging spool directory");
        for file in self.files.drain(..) {
            if let Err(e) = std::fs::remove_file(&file) {
                tracing::warn!(
                    path = %file.display(),
                    error = %e,
                    "Failed to delete spooled bulk data"
                );
            }
        }
        if let Err(e) = std::fs::remove_dir(&directory) {
            tracing::warn!(
                directory = %directory.display(),
                error = %e,
                "Failed to delete spool directory"
            );
        }
    }
}

impl Drop for BulkDataStore {
    fn drop(&mut self) {
        self.purge();
    }
}

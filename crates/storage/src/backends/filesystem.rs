//! Local filesystem instance store.
//!
//! Instances are laid out as `{root}/{aet}/{study}/{series}/{sop}/`. A
//! completed data set is written as DICOM JSON `metadata.json` next to a
//! `bulkdata/` directory holding its payloads; a raw Part 10 object is
//! written as `instance.dcm`. Every instance is assembled in a staging
//! directory below `{root}/.incoming` and renamed into place, so readers
//! never see a partially written instance.

use crate::error::{StorageError, StorageResult, StoreError};
use crate::traits::{ByteStream, CompletedInstance, InstanceStore, StoreContext, StoredInstance};
use async_trait::async_trait;
use dicom::object::OpenFileOptions;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use stow_core::dictionary::missing_attribute_message;
use stow_core::uid::validate_uid;
use stow_core::{AttributeTree, Fragment, Tag, VR, Value, status, tags};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Staging area for instances being written.
const INCOMING_DIR: &str = ".incoming";

const METADATA_FILE: &str = "metadata.json";
const INSTANCE_FILE: &str = "instance.dcm";
const BULKDATA_DIR: &str = "bulkdata";

/// Available Transfer Syntax UID, recorded in stored metadata.
const AVAILABLE_TRANSFER_SYNTAX_UID: Tag = Tag(0x0008, 0x3002);

/// Filesystem-backed instance store.
pub struct FilesystemInstanceStore {
    root: PathBuf,
}

/// A spooled payload to be copied into the instance directory.
#[derive(Debug)]
struct CopyJob {
    source: PathBuf,
    target: String,
}

impl FilesystemInstanceStore {
    /// Create a new store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(INCOMING_DIR)).await?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the given instance.
    pub fn instance_dir(&self, aet: &str, instance: &StoredInstance) -> PathBuf {
        self.root
            .join(aet)
            .join(&instance.study_instance_uid)
            .join(&instance.series_instance_uid)
            .join(&instance.sop_instance_uid)
    }

    async fn create_staging_dir(&self) -> StorageResult<PathBuf> {
        let staging = self.root.join(INCOMING_DIR).join(Uuid::new_v4().to_string());
        fs::create_dir_all(&staging).await?;
        Ok(staging)
    }

    /// Move a fully written staging directory to its final location.
    async fn commit(
        &self,
        ctx: &StoreContext,
        staging: &Path,
        instance: &StoredInstance,
    ) -> Result<PathBuf, StoreError> {
        validate_aet(&ctx.aet)?;
        let target = self.instance_dir(&ctx.aet, instance);
        if fs::try_exists(&target).await.map_err(StorageError::Io)? {
            return Err(StoreError::duplicate(instance));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        // A concurrent writer of the same instance wins the rename; the
        // target is never empty, so ours fails instead of merging.
        match fs::rename(staging, &target).await {
            Ok(()) => Ok(target),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::AlreadyExists | std::io::ErrorKind::DirectoryNotEmpty
                ) =>
            {
                Err(StoreError::duplicate(instance))
            }
            Err(e) => Err(StoreError::from(e).with_instance(instance.clone())),
        }
    }

    async fn write_dataset(
        &self,
        staging: &Path,
        instance: &CompletedInstance,
    ) -> Result<StoredInstance, StoreError> {
        let identity = identity_of(&instance.attributes)?;

        let mut attributes = instance.attributes.clone();
        let jobs = relocate_bulk_data(&mut attributes)?;
        attributes.set_string(
            AVAILABLE_TRANSFER_SYNTAX_UID,
            VR::UI,
            instance.transfer_syntax_uid.clone(),
        );

        if !jobs.is_empty() {
            fs::create_dir_all(staging.join(BULKDATA_DIR)).await?;
        }
        for job in &jobs {
            fs::copy(&job.source, staging.join(&job.target)).await?;
        }

        let json = stow_core::json::write_dataset(&attributes)
            .map_err(|e| StoreError::new(status::PROCESSING_FAILURE, e.to_string()))?;
        let mut file = fs::File::create(staging.join(METADATA_FILE)).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;

        Ok(identity)
    }

    async fn write_stream(
        &self,
        staging: &Path,
        mut stream: ByteStream,
    ) -> Result<StoredInstance, StoreError> {
        let path = staging.join(INSTANCE_FILE);
        let mut file = fs::File::create(&path).await?;
        let mut size = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.sync_all().await?;
        drop(file);
        tracing::debug!(size, "Received binary instance");

        tokio::task::spawn_blocking(move || read_identity(&path))
            .await
            .map_err(|e| {
                StoreError::from(StorageError::Io(std::io::Error::other(format!(
                    "spawn_blocking failed: {e}"
                ))))
            })?
    }
}

/// Remove a staging directory that did not make it into the store.
async fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(
            path = %staging.display(),
            error = %e,
            "Failed to remove staging directory"
        );
    }
}

fn validate_aet(aet: &str) -> Result<(), StoreError> {
    if aet.is_empty() || aet.contains(['/', '\\']) || aet == "." || aet == ".." {
        return Err(StorageError::InvalidKey(format!("AE title {aet:?}")).into());
    }
    Ok(())
}

fn required_uid(attributes: &AttributeTree, tag: Tag) -> Result<String, StoreError> {
    let uid = attributes.get_string(tag).ok_or_else(|| {
        StoreError::new(
            status::IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS,
            missing_attribute_message(tag),
        )
    })?;
    checked_uid(uid)
}

fn checked_uid(uid: &str) -> Result<String, StoreError> {
    validate_uid(uid).map_err(|e| StoreError::new(status::PROCESSING_FAILURE, e.to_string()))?;
    Ok(uid.to_string())
}

fn identity_of(attributes: &AttributeTree) -> Result<StoredInstance, StoreError> {
    Ok(StoredInstance {
        sop_class_uid: required_uid(attributes, tags::SOP_CLASS_UID)?,
        sop_instance_uid: required_uid(attributes, tags::SOP_INSTANCE_UID)?,
        study_instance_uid: required_uid(attributes, tags::STUDY_INSTANCE_UID)?,
        series_instance_uid: required_uid(attributes, tags::SERIES_INSTANCE_UID)?,
    })
}

/// Point every resolved bulk data reference at its copy below `bulkdata/`.
fn relocate_bulk_data(attributes: &mut AttributeTree) -> Result<Vec<CopyJob>, StoreError> {
    let mut jobs: Vec<CopyJob> = Vec::new();
    let mut relocate = |bulk: &mut stow_core::BulkData| -> Result<(), StoreError> {
        let payload = bulk.payload.as_ref().ok_or_else(|| {
            StoreError::new(
                status::PROCESSING_FAILURE,
                format!("Unresolved bulk data {}", bulk.uri),
            )
        })?;
        let target = format!("{BULKDATA_DIR}/{}", jobs.len() + 1);
        jobs.push(CopyJob {
            source: payload.path.clone(),
            target: target.clone(),
        });
        bulk.uri = target;
        Ok(())
    };

    attributes.walk_mut(&mut |_, attr| match &mut attr.value {
        Value::BulkData(bulk) => relocate(bulk),
        Value::Fragments(fragments) => {
            for fragment in fragments {
                if let Fragment::BulkData(bulk) = fragment {
                    relocate(bulk)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    })?;
    Ok(jobs)
}

/// Parse a Part 10 file up to the pixel data and extract its identity.
fn read_identity(path: &Path) -> Result<StoredInstance, StoreError> {
    let object = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| {
            StoreError::new(
                status::CANNOT_UNDERSTAND,
                format!("Failed to parse DICOM object: {e}"),
            )
        })?;

    let element_uid = |tag: Tag| -> Option<String> {
        let value = object.element(tag).ok()?.to_str().ok()?;
        let value = value.trim_end_matches(['\0', ' ']).trim();
        (!value.is_empty()).then(|| value.to_string())
    };
    let required = |tag: Tag| -> Result<String, StoreError> {
        let uid = element_uid(tag).ok_or_else(|| {
            StoreError::new(
                status::IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS,
                missing_attribute_message(tag),
            )
        })?;
        checked_uid(&uid)
    };

    let sop_class_uid = match element_uid(tags::SOP_CLASS_UID) {
        Some(uid) => checked_uid(&uid)?,
        None => {
            let from_meta = object
                .meta()
                .media_storage_sop_class_uid()
                .trim_end_matches(['\0', ' ']);
            if from_meta.is_empty() {
                return Err(StoreError::new(
                    status::IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS,
                    missing_attribute_message(tags::SOP_CLASS_UID),
                ));
            }
            checked_uid(from_meta)?
        }
    };

    Ok(StoredInstance {
        sop_class_uid,
        sop_instance_uid: required(tags::SOP_INSTANCE_UID)?,
        study_instance_uid: required(tags::STUDY_INSTANCE_UID)?,
        series_instance_uid: required(tags::SERIES_INSTANCE_UID)?,
    })
}

#[async_trait]
impl InstanceStore for FilesystemInstanceStore {
    #[instrument(
        skip(self, ctx, instance),
        fields(backend = "filesystem", aet = %ctx.aet, request_id = %ctx.request_id)
    )]
    async fn store_dataset(
        &self,
        ctx: &StoreContext,
        instance: &CompletedInstance,
    ) -> Result<StoredInstance, StoreError> {
        let staging = self.create_staging_dir().await?;
        let result = match self.write_dataset(&staging, instance).await {
            Ok(stored) => self.commit(ctx, &staging, &stored).await.map(|_| stored),
            Err(e) => Err(e),
        };
        if result.is_err() {
            discard(&staging).await;
        }
        result
    }

    #[instrument(
        skip(self, ctx, stream),
        fields(backend = "filesystem", aet = %ctx.aet, request_id = %ctx.request_id)
    )]
    async fn store_stream(
        &self,
        ctx: &StoreContext,
        stream: ByteStream,
    ) -> Result<StoredInstance, StoreError> {
        let staging = self.create_staging_dir().await?;
        let result = match self.write_stream(&staging, stream).await {
            Ok(stored) => self.commit(ctx, &staging, &stored).await.map(|_| stored),
            Err(e) => Err(e),
        };
        if result.is_err() {
            discard(&staging).await;
        }
        result
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

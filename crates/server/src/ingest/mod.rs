//! STOW request ingestion.
//!
//! An [`IngestSession`] owns everything one request needs: the persistence
//! context, the bulk data spool, the candidate objects parsed from metadata
//! parts and the result aggregator. Parts are consumed in arrival order;
//! complete objects are persisted as they stream in, metadata candidates
//! once the whole body has been read. The spool is purged when the session
//! finishes or is dropped, so a disconnected client leaves nothing behind.

pub mod classifier;
pub mod completion;
pub mod response;

pub use classifier::{InputMode, PartKind};
pub use response::{OutputFormat, ResultAggregator};

use crate::error::{ApiError, ApiResult};
use crate::metrics::{BULKDATA_BYTES_SPOOLED, INSTANCES_STORED, record_instance_failure};
use axum::http::header::{CONTENT_LOCATION, CONTENT_TYPE};
use axum::response::Response;
use multer::{Field, Multipart};
use std::path::PathBuf;
use std::sync::Arc;
use stow_core::media_type::APPLICATION_OCTET_STREAM;
use stow_core::{AttributeTree, MediaType, tags};
use stow_storage::{
    BulkDataStore, ByteStream, CompletedInstance, InstanceStore, StorageError, StoreContext,
    StoreError, StoredInstance,
};

/// Lifecycle of a request, reported in trace logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IngestPhase {
    AwaitingParts,
    ClassifyingParts,
    ProcessingCandidates,
    Aggregating,
    Responding,
    Done,
}

/// Request-scoped ingest state.
pub struct IngestSession {
    ctx: StoreContext,
    mode: InputMode,
    phase: IngestPhase,
    store: Arc<dyn InstanceStore>,
    spool: BulkDataStore,
    candidates: Vec<AttributeTree>,
    results: ResultAggregator,
}

impl IngestSession {
    pub fn new(
        ctx: StoreContext,
        mode: InputMode,
        store: Arc<dyn InstanceStore>,
        spool_root: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            mode,
            phase: IngestPhase::AwaitingParts,
            store,
            spool: BulkDataStore::new(spool_root),
            candidates: Vec::new(),
            results: ResultAggregator::new(base_url),
        }
    }

    /// Drive the request to completion and build the response.
    pub async fn run(
        mut self,
        multipart: Multipart<'static>,
        format: OutputFormat,
    ) -> ApiResult<Response> {
        self.receive(multipart).await?;
        self.process_candidates().await;
        self.respond(format)
    }

    /// Consume every part of the body.
    async fn receive(&mut self, mut multipart: Multipart<'static>) -> ApiResult<()> {
        self.enter(IngestPhase::ClassifyingParts);
        let mut index = 0usize;
        while let Some(field) = multipart.next_field().await? {
            index += 1;
            if let Err(e) = self.handle_part(field).await {
                tracing::warn!(
                    request_id = %self.ctx.request_id,
                    part = index,
                    error = %e,
                    "Failed to process part"
                );
                return Err(e);
            }
        }
        tracing::debug!(
            request_id = %self.ctx.request_id,
            parts = index,
            candidates = self.candidates.len(),
            spooled = self.spool.len(),
            "Received all parts"
        );
        Ok(())
    }

    async fn handle_part(&mut self, field: Field<'static>) -> ApiResult<()> {
        let part_type = part_media_type(&field)?;
        match self.mode.classify(&part_type) {
            PartKind::Instance => {
                let result = self.store.store_stream(&self.ctx, part_stream(field)).await;
                match result {
                    Ok(stored) => self.record_stored(&stored),
                    Err(e) if e.is_stream_failure() => {
                        return Err(ApiError::Internal(format!("failed to read part: {e}")));
                    }
                    Err(e) => self.record_rejected(e),
                }
            }
            PartKind::Metadata => {
                let document = field.bytes().await?;
                let trees = self.mode.read_metadata(&document)?;
                self.candidates.extend(trees);
            }
            PartKind::BulkData => {
                let location = field
                    .headers()
                    .get(CONTENT_LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let Some(location) = location else {
                    tracing::warn!(
                        request_id = %self.ctx.request_id,
                        media_type = %part_type,
                        "Ignoring bulk data part without Content-Location"
                    );
                    return Ok(());
                };
                let length = self
                    .spool
                    .spool(&location, part_type, part_stream(field))
                    .await?;
                BULKDATA_BYTES_SPOOLED.inc_by(length);
            }
            PartKind::Unexpected => {
                return Err(ApiError::BadRequest(format!(
                    "unexpected part of type {part_type} in {} request",
                    self.mode.media_type()
                )));
            }
        }
        Ok(())
    }

    /// Complete and persist the candidates in arrival order.
    async fn process_candidates(&mut self) {
        self.enter(IngestPhase::ProcessingCandidates);
        let candidates = std::mem::take(&mut self.candidates);
        for (index, mut tree) in candidates.into_iter().enumerate() {
            match completion::complete(&mut tree, index + 1, &self.spool).await {
                Ok(transfer_syntax_uid) => {
                    let instance = CompletedInstance {
                        attributes: tree,
                        transfer_syntax_uid,
                    };
                    match self.store.store_dataset(&self.ctx, &instance).await {
                        Ok(stored) => self.record_stored(&stored),
                        Err(e) if e.instance.is_some() => self.record_rejected(e),
                        Err(e) => {
                            let attributes = &instance.attributes;
                            self.record_failure(
                                attributes.get_string(tags::SOP_CLASS_UID).map(str::to_string),
                                attributes
                                    .get_string(tags::SOP_INSTANCE_UID)
                                    .map(str::to_string),
                                e.code,
                                e.message,
                            );
                        }
                    }
                }
                Err(e) => {
                    self.record_failure(
                        tree.get_string(tags::SOP_CLASS_UID).map(str::to_string),
                        tree.get_string(tags::SOP_INSTANCE_UID).map(str::to_string),
                        e.code,
                        e.message,
                    );
                }
            }
        }
    }

    fn respond(mut self, format: OutputFormat) -> ApiResult<Response> {
        self.enter(IngestPhase::Aggregating);
        tracing::info!(
            request_id = %self.ctx.request_id,
            aet = %self.ctx.aet,
            mode = self.mode.name(),
            stored = self.results.referenced().len(),
            failed = self.results.failed().len(),
            status = %self.results.status(),
            "STOW request completed"
        );

        self.enter(IngestPhase::Responding);
        self.spool.purge();
        let results = std::mem::replace(&mut self.results, ResultAggregator::new(""));
        let response = results.into_response(format);
        self.enter(IngestPhase::Done);
        response
    }

    fn enter(&mut self, phase: IngestPhase) {
        tracing::trace!(
            request_id = %self.ctx.request_id,
            from = ?self.phase,
            to = ?phase,
            "Ingest phase"
        );
        self.phase = phase;
    }

    fn record_stored(&mut self, stored: &StoredInstance) {
        tracing::debug!(
            request_id = %self.ctx.request_id,
            sop_instance_uid = %stored.sop_instance_uid,
            "Stored instance"
        );
        INSTANCES_STORED.with_label_values(&[self.mode.name()]).inc();
        self.results.record_success(stored);
    }

    fn record_rejected(&mut self, e: StoreError) {
        let (sop_class_uid, sop_instance_uid) = match e.instance {
            Some(instance) => (
                Some(instance.sop_class_uid),
                Some(instance.sop_instance_uid),
            ),
            None => (None, None),
        };
        self.record_failure(sop_class_uid, sop_instance_uid, e.code, e.message);
    }

    fn record_failure(
        &mut self,
        sop_class_uid: Option<String>,
        sop_instance_uid: Option<String>,
        code: u16,
        message: String,
    ) {
        tracing::info!(
            request_id = %self.ctx.request_id,
            sop_instance_uid = sop_instance_uid.as_deref().unwrap_or("-"),
            code = %format!("{code:#06X}"),
            message = %message,
            "Instance rejected"
        );
        record_instance_failure(code);
        self.results
            .record_failure(sop_class_uid, sop_instance_uid, code, message);
    }
}

/// Declared media type of a part; a part without one is opaque bytes.
fn part_media_type(field: &Field<'_>) -> ApiResult<MediaType> {
    let Some(value) = field.headers().get(CONTENT_TYPE) else {
        return Ok(MediaType::parse(APPLICATION_OCTET_STREAM)?);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("part Content-Type is not ASCII".to_string()))?;
    MediaType::parse(value)
        .map_err(|e| ApiError::BadRequest(format!("invalid part Content-Type: {e}")))
}

/// Stream a part's body; tokenizer failures surface as stream errors.
fn part_stream(mut field: Field<'static>) -> ByteStream {
    let stream = async_stream::try_stream! {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| StorageError::Stream(e.to_string()))?
        {
            yield chunk;
        }
    };

    Box::pin(stream)
}

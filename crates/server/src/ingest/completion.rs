//! Completion and validation of candidate objects.
//!
//! A candidate parsed from a metadata document is turned into a storable
//! instance by resolving its bulk data references against the request
//! spool, supplementing the attributes a store requires, recovering image
//! geometry from compressed pixel data and checking the Image Pixel Module.
//! Every step only fills in what is absent, so completing an already
//! completed tree leaves it unchanged.

use std::path::PathBuf;
use stow_codec::CompressedPixelData;
use stow_core::dictionary::{keyword_of, missing_attribute_message, tag_display};
use stow_core::media_type::{self, APPLICATION_OCTET_STREAM};
use stow_core::uid::{self, transfer_syntax};
use stow_core::{AttributeTree, BulkData, Fragment, SpooledPayload, Tag, VR, Value, status, tags};
use stow_storage::BulkDataStore;
use time::OffsetDateTime;
use time::macros::format_description;

/// Series Number given to objects that do not carry one.
pub const DEFAULT_SERIES_NUMBER: i64 = 999;

/// Attributes every object with pixel data must carry.
const IMAGE_PIXEL_TAGS: [Tag; 8] = [
    tags::SAMPLES_PER_PIXEL,
    tags::PHOTOMETRIC_INTERPRETATION,
    tags::ROWS,
    tags::COLUMNS,
    tags::BITS_ALLOCATED,
    tags::BITS_STORED,
    tags::HIGH_BIT,
    tags::PIXEL_REPRESENTATION,
];

const IDENTITY_TAGS: [Tag; 3] = [
    tags::STUDY_INSTANCE_UID,
    tags::SERIES_INSTANCE_UID,
    tags::SOP_INSTANCE_UID,
];

/// Per-object failure raised while completing a candidate.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CompletionError {
    pub code: u16,
    pub message: String,
}

impl CompletionError {
    fn missing_attribute(tag: Tag) -> Self {
        Self {
            code: status::IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS,
            message: missing_attribute_message(tag),
        }
    }

    fn missing_bulk_data(uri: &str) -> Self {
        Self {
            code: status::MISSING_BULKDATA,
            message: format!("Missing Bulkdata: {uri}"),
        }
    }
}

/// Complete `tree` in place and return the transfer syntax in which its
/// bulk data was received. `position` is the 1-based arrival position of
/// the candidate in the request.
pub async fn complete(
    tree: &mut AttributeTree,
    position: usize,
    spool: &BulkDataStore,
) -> Result<String, CompletionError> {
    let resolved = resolve_bulk_data(tree, spool)?;
    let selected = select_payload(tree, &resolved);
    let mut transfer_syntax_uid = selected
        .as_ref()
        .map(|p| media_type::transfer_syntax_of(&p.media_type))
        .unwrap_or_else(|| transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN.to_string());

    supplement(tree, position, selected)?;

    if tree.contains_value(tags::PIXEL_DATA) {
        if let Some(payload) = pixel_data_payload(tree) {
            if let Some(ts) = enrich_from_pixel_data(tree, payload).await {
                transfer_syntax_uid = ts;
            }
        }
        verify_image_pixel_module(tree)?;
    }

    Ok(transfer_syntax_uid)
}

/// Resolve every bulk data placeholder against the spool.
///
/// Pixel data received in any media type other than
/// `application/octet-stream` becomes encapsulated: an empty first
/// fragment followed by the reference. Returns the resolved references in
/// visiting order.
fn resolve_bulk_data(
    tree: &mut AttributeTree,
    spool: &BulkDataStore,
) -> Result<Vec<(Tag, SpooledPayload)>, CompletionError> {
    let mut resolved = Vec::new();
    let mut resolve = |tag: Tag, bulk: &mut BulkData| -> Result<(), CompletionError> {
        if bulk.payload.is_none() {
            let payload = spool
                .get(&bulk.uri)
                .ok_or_else(|| CompletionError::missing_bulk_data(&bulk.uri))?;
            bulk.payload = Some(payload.clone());
        }
        if let Some(payload) = &bulk.payload {
            resolved.push((tag, payload.clone()));
        }
        Ok(())
    };

    tree.walk_mut(&mut |tag, attr| -> Result<(), CompletionError> {
        match &mut attr.value {
            Value::BulkData(bulk) => {
                resolve(tag, bulk)?;
                let encapsulate = tag == tags::PIXEL_DATA
                    && bulk
                        .payload
                        .as_ref()
                        .is_some_and(|p| !p.media_type.is(APPLICATION_OCTET_STREAM));
                if encapsulate {
                    let bulk = bulk.clone();
                    attr.vr = VR::OB;
                    attr.value = Value::Fragments(vec![
                        Fragment::Bytes(Vec::new()),
                        Fragment::BulkData(bulk),
                    ]);
                }
            }
            Value::Fragments(fragments) => {
                for fragment in fragments {
                    if let Fragment::BulkData(bulk) = fragment {
                        resolve(tag, bulk)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(resolved)
}

/// The payload whose media type describes the object: the pixel data's,
/// else the encapsulated document's, else the last one resolved.
fn select_payload(tree: &AttributeTree, resolved: &[(Tag, SpooledPayload)]) -> Option<SpooledPayload> {
    let top_level = |tag: Tag| match tree.get(tag).map(|a| &a.value) {
        Some(Value::BulkData(bulk)) => bulk.payload.clone(),
        Some(Value::Fragments(fragments)) => first_fragment_payload(fragments),
        _ => None,
    };
    top_level(tags::PIXEL_DATA)
        .or_else(|| top_level(tags::ENCAPSULATED_DOCUMENT))
        .or_else(|| resolved.last().map(|(_, payload)| payload.clone()))
}

fn first_fragment_payload(fragments: &[Fragment]) -> Option<SpooledPayload> {
    fragments.iter().find_map(|f| match f {
        Fragment::BulkData(bulk) => bulk.payload.clone(),
        Fragment::Bytes(_) => None,
    })
}

fn pixel_data_payload(tree: &AttributeTree) -> Option<SpooledPayload> {
    match &tree.get(tags::PIXEL_DATA)?.value {
        Value::BulkData(bulk) => bulk.payload.clone(),
        Value::Fragments(fragments) => first_fragment_payload(fragments),
        _ => None,
    }
}

fn log_supplement(tag: Tag, value: &dyn std::fmt::Display) {
    tracing::info!(
        "Supplement Missing {} {} - {}",
        keyword_of(tag),
        tag_display(tag),
        value
    );
}

fn supplement(
    tree: &mut AttributeTree,
    position: usize,
    selected: Option<SpooledPayload>,
) -> Result<(), CompletionError> {
    for tag in IDENTITY_TAGS {
        if !tree.contains_value(tag) {
            let uid = uid::create_uid();
            log_supplement(tag, &uid);
            tree.set_string(tag, VR::UI, uid);
        }
    }

    if !tree.contains_value(tags::SOP_CLASS_UID) {
        let sop_class_uid = selected
            .as_ref()
            .and_then(|p| media_type::sop_class_of(&p.media_type))
            .ok_or_else(|| CompletionError::missing_attribute(tags::SOP_CLASS_UID))?;
        log_supplement(tags::SOP_CLASS_UID, &sop_class_uid);
        tree.set_string(tags::SOP_CLASS_UID, VR::UI, sop_class_uid);
    }

    if !tree.contains_value(tags::INSTANCE_CREATION_DATE) {
        let now = OffsetDateTime::now_utc();
        let date = now
            .format(format_description!("[year][month][day]"))
            .map_err(|e| processing_failure(e.to_string()))?;
        let time = now
            .format(format_description!("[hour][minute][second].[subsecond digits:3]"))
            .map_err(|e| processing_failure(e.to_string()))?;
        log_supplement(tags::INSTANCE_CREATION_DATE, &format!("{date}{time}"));
        tree.set_string(tags::INSTANCE_CREATION_DATE, VR::DA, date);
        tree.set_string(tags::INSTANCE_CREATION_TIME, VR::TM, time);
    }

    if !tree.contains_value(tags::SERIES_NUMBER) {
        log_supplement(tags::SERIES_NUMBER, &DEFAULT_SERIES_NUMBER);
        tree.set_int(tags::SERIES_NUMBER, VR::IS, DEFAULT_SERIES_NUMBER);
    }

    if !tree.contains_value(tags::INSTANCE_NUMBER) {
        log_supplement(tags::INSTANCE_NUMBER, &position);
        tree.set_int(tags::INSTANCE_NUMBER, VR::IS, position as i64);
    }
    Ok(())
}

fn processing_failure(message: String) -> CompletionError {
    CompletionError {
        code: status::PROCESSING_FAILURE,
        message,
    }
}

/// Merge attributes recovered from the compressed pixel data headers.
///
/// Returns the transfer syntax implied by the stream, if any. Inspection
/// failures are logged and otherwise ignored.
async fn enrich_from_pixel_data(tree: &mut AttributeTree, payload: SpooledPayload) -> Option<String> {
    let codec = CompressedPixelData::from_media_type(&payload.media_type)?;
    let path: PathBuf = payload.path.clone();

    let sniffed = match tokio::task::spawn_blocking(move || codec.sniff_file(&path)).await {
        Ok(Ok(sniffed)) => sniffed,
        Ok(Err(e)) => {
            tracing::info!(
                codec = codec.name(),
                path = %payload.path.display(),
                error = %e,
                "Failed to parse compressed pixel data"
            );
            return None;
        }
        Err(e) => {
            tracing::info!(codec = codec.name(), error = %e, "Pixel data inspection aborted");
            return None;
        }
    };

    tree.merge_missing(sniffed.attributes);
    sniffed.transfer_syntax_uid
}

fn verify_image_pixel_module(tree: &AttributeTree) -> Result<(), CompletionError> {
    if let Some(tag) = IMAGE_PIXEL_TAGS
        .into_iter()
        .find(|tag| !tree.contains_value(*tag))
    {
        return Err(CompletionError::missing_attribute(tag));
    }
    if tree.get_int(tags::SAMPLES_PER_PIXEL).unwrap_or(1) > 1
        && !tree.contains_value(tags::PLANAR_CONFIGURATION)
    {
        return Err(CompletionError::missing_attribute(tags::PLANAR_CONFIGURATION));
    }
    Ok(())
}

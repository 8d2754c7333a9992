use bytes::Bytes;
use std::path::Path;
use stow_core::uid::{sop_class, transfer_syntax};
use stow_core::{AttributeTree, MediaType, SpooledPayload, VR, tags};
use stow_storage::{ByteStream, CompletedInstance, StorageError, StorageResult};

pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.9.7433";

/// Builder for a minimal explicit VR little endian Part 10 file.
#[derive(Clone, Debug)]
pub struct Part10 {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub study_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
}

#[allow(dead_code)]
impl Part10 {
    pub fn new(sop_instance_uid: &str) -> Self {
        Self {
            sop_class_uid: sop_class::VL_PHOTOGRAPHIC_IMAGE_STORAGE.to_string(),
            sop_instance_uid: sop_instance_uid.to_string(),
            study_instance_uid: Some("1.2.3".to_string()),
            series_instance_uid: Some("1.2.3.4".to_string()),
        }
    }

    pub fn without_study(mut self) -> Self {
        self.study_instance_uid = None;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut meta = Vec::new();
        element_ob(&mut meta, 0x0002, 0x0001, &[0x00, 0x01]);
        element(&mut meta, 0x0002, 0x0002, b"UI", self.sop_class_uid.as_bytes());
        element(&mut meta, 0x0002, 0x0003, b"UI", self.sop_instance_uid.as_bytes());
        element(
            &mut meta,
            0x0002,
            0x0010,
            b"UI",
            transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN.as_bytes(),
        );
        element(&mut meta, 0x0002, 0x0012, b"UI", IMPLEMENTATION_CLASS_UID.as_bytes());

        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        element(
            &mut out,
            0x0002,
            0x0000,
            b"UL",
            &(meta.len() as u32).to_le_bytes(),
        );
        out.extend_from_slice(&meta);

        element(&mut out, 0x0008, 0x0016, b"UI", self.sop_class_uid.as_bytes());
        element(&mut out, 0x0008, 0x0018, b"UI", self.sop_instance_uid.as_bytes());
        element(&mut out, 0x0010, 0x0010, b"PN", b"Doe^Jane");
        if let Some(study) = &self.study_instance_uid {
            element(&mut out, 0x0020, 0x000D, b"UI", study.as_bytes());
        }
        if let Some(series) = &self.series_instance_uid {
            element(&mut out, 0x0020, 0x000E, b"UI", series.as_bytes());
        }
        out
    }
}

/// Short-form explicit VR element, padded to even length.
fn element(out: &mut Vec<u8>, group: u16, elem: u16, vr: &[u8; 2], value: &[u8]) {
    let mut value = value.to_vec();
    if value.len() % 2 == 1 {
        value.push(if vr == b"UI" { 0 } else { b' ' });
    }
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&elem.to_le_bytes());
    out.extend_from_slice(vr);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(&value);
}

fn element_ob(out: &mut Vec<u8>, group: u16, elem: u16, value: &[u8]) {
    out.extend_from_slice(&group.to_le_bytes());
    out.extend_from_slice(&elem.to_le_bytes());
    out.extend_from_slice(b"OB\0\0");
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value);
}

/// Stream `data` in chunks of `chunk_size` bytes.
#[allow(dead_code)]
pub fn byte_stream(data: Vec<u8>, chunk_size: usize) -> ByteStream {
    let chunks: Vec<StorageResult<Bytes>> = data
        .chunks(chunk_size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// A stream that yields `data` and then fails.
#[allow(dead_code)]
pub fn failing_stream(data: Vec<u8>) -> ByteStream {
    let chunks: Vec<StorageResult<Bytes>> = vec![
        Ok(Bytes::from(data)),
        Err(StorageError::Stream("client disconnected".to_string())),
    ];
    Box::pin(futures::stream::iter(chunks))
}

/// Write `data` to `dir/name` and describe it as a spooled payload.
#[allow(dead_code)]
pub fn spooled_payload(dir: &Path, name: &str, media_type: &str, data: &[u8]) -> SpooledPayload {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    SpooledPayload {
        path,
        media_type: MediaType::parse(media_type).unwrap(),
        length: data.len() as u64,
    }
}

/// A completed photographic instance without bulk data.
#[allow(dead_code)]
pub fn photo_instance(sop_instance_uid: &str) -> CompletedInstance {
    let mut attributes = AttributeTree::new();
    attributes.set_string(
        tags::SOP_CLASS_UID,
        VR::UI,
        sop_class::VL_PHOTOGRAPHIC_IMAGE_STORAGE,
    );
    attributes.set_string(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid);
    attributes.set_string(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3");
    attributes.set_string(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4");
    attributes.set_int(tags::INSTANCE_NUMBER, VR::IS, 1);
    CompletedInstance {
        attributes,
        transfer_syntax_uid: transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
    }
}

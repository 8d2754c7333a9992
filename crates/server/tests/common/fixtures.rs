//! Test fixtures for building STOW request bodies.

use serde_json::{Value, json};
use stow_core::uid::{sop_class, transfer_syntax};

pub const BOUNDARY: &str = "stow-test-boundary";

pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.9.7433";

/// Builder for a `multipart/related` request body.
#[derive(Debug, Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

#[allow(dead_code)]
impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a part with optional `Content-Type` and `Content-Location`.
    pub fn part(
        mut self,
        content_type: Option<&str>,
        content_location: Option<&str>,
        data: impl AsRef<[u8]>,
    ) -> Self {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        if let Some(content_type) = content_type {
            self.body
                .extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        if let Some(location) = content_location {
            self.body
                .extend_from_slice(format!("Content-Location: {location}\r\n").as_bytes());
        }
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(data.as_ref());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn dicom(self, data: impl AsRef<[u8]>) -> Self {
        self.part(Some("application/dicom"), None, data)
    }

    pub fn json(self, document: &Value) -> Self {
        let data = serde_json::to_vec(document).unwrap();
        self.part(Some("application/dicom+json"), None, data)
    }

    pub fn bulk(self, content_type: &str, location: &str, data: impl AsRef<[u8]>) -> Self {
        self.part(Some(content_type), Some(location), data)
    }

    pub fn build(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

/// Request content type for the given root part media type.
pub fn related_content_type(root_type: &str) -> String {
    format!("multipart/related; type=\"{root_type}\"; boundary={BOUNDARY}")
}

/// Builder for a minimal explicit VR little endian Part 10 file.
#[derive(Clone, Debug)]
pub struct Part10 {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
}

#[allow(dead_code)]
impl Part10 {
    pub fn new(sop_instance_uid: &str) -> Self {
        Self {
            sop_class_uid: sop_class::VL_PHOTOGRAPHIC_IMAGE_STORAGE.to_string(),
            sop_instance_uid: sop_instance_uid.to_string(),
            study_instance_uid: "1.2.3".to_string(),
            series_instance_uid: "1.2.3.4".to_string(),
        }
    }

    pub fn in_study(mut self, study_instance_uid: &str) -> Self {
        self.study_instance_uid = study_instance_uid.to_string();
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
        element(&mut out, 0x0020, 0x000D, b"UI", self.study_instance_uid.as_bytes());
        element(&mut out, 0x0020, 0x000E, b"UI", self.series_instance_uid.as_bytes());
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

/// Baseline JPEG headers with an 8 bit SOF0 frame.
#[allow(dead_code)]
pub fn jpeg_header(rows: u16, columns: u16, components: u8) -> Vec<u8> {
    let length = 8 + 3 * u16::from(components);
    let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xC0];
    jpeg.extend_from_slice(&length.to_be_bytes());
    jpeg.push(8);
    jpeg.extend_from_slice(&rows.to_be_bytes());
    jpeg.extend_from_slice(&columns.to_be_bytes());
    jpeg.push(components);
    for id in 1..=components {
        jpeg.extend_from_slice(&[id, 0x11, 0x00]);
    }
    jpeg.extend_from_slice(&[0xFF, 0xD9]);
    jpeg
}

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn full_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(payload);
    mp4_box(kind, &body)
}

/// MP4 file with one AVC video track of `samples` frames at 25 fps.
#[allow(dead_code)]
pub fn mp4_avc(profile: u8, level: u8, columns: u16, rows: u16, samples: u32) -> Vec<u8> {
    let mut visual = vec![0u8; 6];
    visual.extend_from_slice(&1u16.to_be_bytes());
    visual.extend_from_slice(&[0u8; 16]);
    visual.extend_from_slice(&columns.to_be_bytes());
    visual.extend_from_slice(&rows.to_be_bytes());
    visual.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    visual.extend_from_slice(&0x0048_0000u32.to_be_bytes());
    visual.extend_from_slice(&[0u8; 4]);
    visual.extend_from_slice(&1u16.to_be_bytes());
    visual.extend_from_slice(&[0u8; 32]);
    visual.extend_from_slice(&0x0018u16.to_be_bytes());
    visual.extend_from_slice(&0xFFFFu16.to_be_bytes());
    visual.extend_from_slice(&mp4_box(b"avcC", &[1, profile, 0, level, 0xFF, 0xE0]));

    let mut stsd = 1u32.to_be_bytes().to_vec();
    stsd.extend_from_slice(&mp4_box(b"avc1", &visual));
    let mut stsz = 0u32.to_be_bytes().to_vec();
    stsz.extend_from_slice(&samples.to_be_bytes());
    let stbl = mp4_box(
        b"stbl",
        &[full_box(b"stsd", &stsd), full_box(b"stsz", &stsz)].concat(),
    );

    let timescale = 25_000u32;
    let mut mdhd = vec![0u8; 8];
    mdhd.extend_from_slice(&timescale.to_be_bytes());
    mdhd.extend_from_slice(&(samples * 1000).to_be_bytes());
    mdhd.extend_from_slice(&[0x55, 0xC4, 0, 0]);

    let mdia = mp4_box(
        b"mdia",
        &[full_box(b"mdhd", &mdhd), mp4_box(b"minf", &stbl)].concat(),
    );
    let moov = mp4_box(
        b"moov",
        &[full_box(b"mvhd", &[0u8; 96]), mp4_box(b"trak", &mdia)].concat(),
    );
    [
        mp4_box(b"ftyp", b"isom\0\0\x02\0isomavc1"),
        moov,
        mp4_box(b"mdat", &[0u8; 16]),
    ]
    .concat()
}

/// A DICOM JSON object whose Pixel Data references `uri`.
#[allow(dead_code)]
pub fn image_metadata(sop_instance_uid: &str, uri: &str) -> Value {
    json!({
        "00080018": {"vr": "UI", "Value": [sop_instance_uid]},
        "0020000D": {"vr": "UI", "Value": ["1.2.3"]},
        "7FE00010": {"vr": "OB", "BulkDataURI": uri}
    })
}

/// A DICOM JSON object whose Encapsulated Document references `uri`.
#[allow(dead_code)]
pub fn document_metadata(sop_instance_uid: &str, uri: &str) -> Value {
    json!({
        "00080018": {"vr": "UI", "Value": [sop_instance_uid]},
        "0020000D": {"vr": "UI", "Value": ["1.2.3"]},
        "00420011": {"vr": "OB", "BulkDataURI": uri}
    })
}

/// DICOM JSON string value of `tag` in `object`.
#[allow(dead_code)]
pub fn json_string<'a>(object: &'a Value, tag: &str) -> Option<&'a str> {
    object[tag]["Value"][0].as_str()
}

/// Items of the DICOM JSON sequence `tag` in `object`.
#[allow(dead_code)]
pub fn json_items<'a>(object: &'a Value, tag: &str) -> Vec<&'a Value> {
    object[tag]["Value"]
        .as_array()
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

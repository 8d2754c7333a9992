//! JPEG family (ISO 10918 and JPEG-LS) frame header inspection.

use crate::error::{CodecError, Result};
use crate::source::{position, read_u8, read_u16, skip};
use crate::Sniffed;
use std::io::{Read, Seek};
use stow_core::{AttributeTree, VR, tags};

const FORMAT: &str = "JPEG";

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;
const SOF55: u8 = 0xF7;

/// Frame header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    pub marker: u8,
    pub precision: u8,
    pub rows: u16,
    pub columns: u16,
    pub components: u8,
}

impl FrameHeader {
    /// Lossless processes: SOF3, SOF7, SOF11, SOF15 and JPEG-LS.
    pub(crate) fn is_lossless(&self) -> bool {
        matches!(self.marker, 0xC3 | 0xC7 | 0xCB | 0xCF | SOF55)
    }

    fn into_attributes(self) -> AttributeTree {
        let precision = i64::from(self.precision);
        let mut attrs = AttributeTree::new();
        attrs.set_int(tags::SAMPLES_PER_PIXEL, VR::US, i64::from(self.components));
        attrs.set_int(tags::ROWS, VR::US, i64::from(self.rows));
        attrs.set_int(tags::COLUMNS, VR::US, i64::from(self.columns));
        attrs.set_int(tags::BITS_ALLOCATED, VR::US, if precision > 8 { 16 } else { 8 });
        attrs.set_int(tags::BITS_STORED, VR::US, precision);
        attrs.set_int(tags::HIGH_BIT, VR::US, precision - 1);
        attrs.set_int(tags::PIXEL_REPRESENTATION, VR::US, 0);

        let photometric = match (self.components, self.is_lossless()) {
            (1, _) => "MONOCHROME2",
            (_, true) => "RGB",
            (_, false) => "YBR_FULL_422",
        };
        attrs.set_string(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, photometric);
        if self.components > 1 {
            attrs.set_int(tags::PLANAR_CONFIGURATION, VR::US, 0);
        }
        if !self.is_lossless() {
            attrs.set_string(tags::LOSSY_IMAGE_COMPRESSION, VR::CS, "01");
        }
        attrs
    }
}

fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF | SOF55)
}

fn is_standalone(marker: u8) -> bool {
    matches!(marker, TEM | SOI | 0xD0..=0xD7)
}

/// Scan markers up to the first start-of-frame segment.
pub(crate) fn read_frame_header<R: Read + Seek>(src: &mut R) -> Result<FrameHeader> {
    if read_u8(src)? != 0xFF || read_u8(src)? != SOI {
        return Err(CodecError::malformed(FORMAT, "missing SOI marker"));
    }

    loop {
        if read_u8(src)? != 0xFF {
            let offset = position(src)? - 1;
            return Err(CodecError::malformed(
                FORMAT,
                format!("expected marker at offset {offset}"),
            ));
        }
        let mut marker = read_u8(src)?;
        while marker == 0xFF {
            marker = read_u8(src)?;
        }

        match marker {
            m if is_standalone(m) => continue,
            EOI => return Err(CodecError::malformed(FORMAT, "end of image before frame header")),
            SOS => return Err(CodecError::malformed(FORMAT, "scan before frame header")),
            m if is_start_of_frame(m) => return read_sof(src, m),
            _ => {
                let length = read_u16(src)?;
                if length < 2 {
                    return Err(CodecError::malformed(
                        FORMAT,
                        format!("segment FF{marker:02X} has length {length}"),
                    ));
                }
                skip(src, u64::from(length - 2))?;
            }
        }
    }
}

fn read_sof<R: Read + Seek>(src: &mut R, marker: u8) -> Result<FrameHeader> {
    let length = read_u16(src)?;
    let header = FrameHeader {
        marker,
        precision: read_u8(src)?,
        rows: read_u16(src)?,
        columns: read_u16(src)?,
        components: read_u8(src)?,
    };
    if length < 8 + 3 * u16::from(header.components) {
        return Err(CodecError::malformed(
            FORMAT,
            format!("frame header length {length} too short"),
        ));
    }
    if !(2..=16).contains(&header.precision) {
        return Err(CodecError::malformed(
            FORMAT,
            format!("sample precision {}", header.precision),
        ));
    }
    if header.rows == 0 || header.columns == 0 {
        return Err(CodecError::malformed(
            FORMAT,
            format!("image size {}x{}", header.columns, header.rows),
        ));
    }
    if !(1..=4).contains(&header.components) {
        return Err(CodecError::malformed(
            FORMAT,
            format!("{} components", header.components),
        ));
    }
    Ok(header)
}

pub(crate) fn sniff<R: Read + Seek>(src: &mut R) -> Result<Sniffed> {
    let header = read_frame_header(src)?;
    Ok(Sniffed {
        attributes: header.into_attributes(),
        transfer_syntax_uid: None,
    })
}

//! Image Pixel attributes shared by the video containers.

use stow_core::{AttributeTree, Tag, VR, tags};

/// Geometry and timing recovered from a video stream header.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct VideoGeometry {
    pub rows: u16,
    pub columns: u16,
    pub bits_stored: u16,
    pub frames: Option<u64>,
    pub frame_rate: Option<f64>,
}

impl VideoGeometry {
    pub(crate) fn into_attributes(self) -> AttributeTree {
        let bits_allocated = if self.bits_stored > 8 { 16 } else { 8 };

        let mut attrs = AttributeTree::new();
        attrs.set_int(tags::SAMPLES_PER_PIXEL, VR::US, 3);
        attrs.set_string(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "YBR_PARTIAL_420");
        attrs.set_int(tags::PLANAR_CONFIGURATION, VR::US, 0);
        attrs.set_int(tags::ROWS, VR::US, i64::from(self.rows));
        attrs.set_int(tags::COLUMNS, VR::US, i64::from(self.columns));
        attrs.set_int(tags::BITS_ALLOCATED, VR::US, bits_allocated);
        attrs.set_int(tags::BITS_STORED, VR::US, i64::from(self.bits_stored));
        attrs.set_int(tags::HIGH_BIT, VR::US, i64::from(self.bits_stored) - 1);
        attrs.set_int(tags::PIXEL_REPRESENTATION, VR::US, 0);
        attrs.set_string(tags::LOSSY_IMAGE_COMPRESSION, VR::CS, "01");

        if let Some(frames) = self.frames
            && let Ok(frames) = i64::try_from(frames)
        {
            attrs.set_int(tags::NUMBER_OF_FRAMES, VR::IS, frames);
        }
        if let Some(rate) = self.frame_rate.filter(|r| r.is_finite() && *r > 0.0) {
            attrs.set_int(tags::CINE_RATE, VR::IS, rate.round() as i64);
            attrs.set_string(tags::FRAME_TIME, VR::DS, format_decimal(1000.0 / rate));
            attrs.set_int(
                tags::FRAME_INCREMENT_POINTER,
                VR::AT,
                pack(tags::FRAME_TIME),
            );
        }
        attrs
    }
}

fn pack(tag: Tag) -> i64 {
    (i64::from(tag.group()) << 16) | i64::from(tag.element())
}

/// Format a decimal string value, which is limited to 16 characters.
fn format_decimal(value: f64) -> String {
    let mut s = format!("{value:.6}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s.truncate(16);
    s
}

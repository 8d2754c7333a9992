//! Header inspection of compressed pixel data.
//!
//! When a metadata document references pixel data that was sent as a
//! compressed bitstream (a JPEG image, an MPEG-2 or MP4 video), the image
//! geometry can be recovered from the stream headers alone. Each supported
//! container is one variant of [`CompressedPixelData`], selected from the
//! media type of the bulk data part.

pub mod error;
mod jpeg;
mod mp4;
mod mpeg2;
mod source;
mod video;

pub use error::{CodecError, Result};

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use stow_core::{AttributeTree, MediaType};

/// Attributes recovered from a compressed bitstream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sniffed {
    /// Image Pixel attributes and related timing attributes.
    pub attributes: AttributeTree,
    /// Transfer syntax implied by the stream, overriding the one derived
    /// from the media type.
    pub transfer_syntax_uid: Option<String>,
}

/// Compressed container formats whose headers can be inspected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressedPixelData {
    Jpeg,
    Mpeg2,
    Mp4,
}

impl CompressedPixelData {
    /// Select the inspector for a bulk data media type, ignoring parameters.
    pub fn from_media_type(media_type: &MediaType) -> Option<Self> {
        if media_type.is("image/jpeg") {
            Some(Self::Jpeg)
        } else if media_type.is("video/mpeg") {
            Some(Self::Mpeg2)
        } else if media_type.is("video/mp4") {
            Some(Self::Mp4)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Mpeg2 => "mpeg2",
            Self::Mp4 => "mp4",
        }
    }

    /// Read the stream headers and return the recovered attributes.
    pub fn sniff<R: Read + Seek>(self, source: &mut R) -> Result<Sniffed> {
        match self {
            Self::Jpeg => jpeg::sniff(source),
            Self::Mpeg2 => mpeg2::sniff(source),
            Self::Mp4 => mp4::sniff(source),
        }
    }

    /// Inspect a spooled file.
    pub fn sniff_file(self, path: &Path) -> Result<Sniffed> {
        let mut reader = BufReader::new(File::open(path)?);
        let sniffed = self.sniff(&mut reader)?;
        tracing::debug!(
            codec = self.name(),
            path = %path.display(),
            recovered = sniffed.attributes.len(),
            transfer_syntax = ?sniffed.transfer_syntax_uid,
            "Inspected compressed pixel data"
        );
        Ok(sniffed)
    }
}

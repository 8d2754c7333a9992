//! UID generation and well-known UIDs.
//!
//! Generated UIDs use the `2.25` root followed by the decimal form of a
//! random UUID, which keeps them globally unique without a registered root.

use crate::error::{Error, Result};
use uuid::Uuid;

/// Maximum length of a UID value.
pub const MAX_UID_LENGTH: usize = 64;

/// Transfer syntax UIDs referenced by the ingest pipeline.
pub mod transfer_syntax {
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
    pub const JPEG_BASELINE_8BIT: &str = "1.2.840.10008.1.2.4.50";
    pub const JPEG_LS_LOSSLESS: &str = "1.2.840.10008.1.2.4.80";
    pub const JPEG_2000_LOSSLESS_ONLY: &str = "1.2.840.10008.1.2.4.90";
    pub const JPEG_2000_PART2_LOSSLESS_ONLY: &str = "1.2.840.10008.1.2.4.92";
    pub const MPEG2_MAIN_PROFILE: &str = "1.2.840.10008.1.2.4.100";
    pub const MPEG4_HIGH_PROFILE: &str = "1.2.840.10008.1.2.4.102";
    pub const MPEG4_HIGH_PROFILE_42_2D: &str = "1.2.840.10008.1.2.4.104";
    pub const HEVC_MAIN_PROFILE: &str = "1.2.840.10008.1.2.4.107";
    pub const HEVC_MAIN10_PROFILE: &str = "1.2.840.10008.1.2.4.108";
}

/// SOP class UIDs the pipeline can infer from bulk data.
pub mod sop_class {
    pub const VL_PHOTOGRAPHIC_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.77.1.4";
    pub const VIDEO_PHOTOGRAPHIC_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.77.1.4.1";
    pub const ENCAPSULATED_PDF_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.1";
    pub const ENCAPSULATED_CDA_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.2";
    pub const ENCAPSULATED_STL_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.3";
}

/// Generate a new globally unique UID under the `2.25` root.
pub fn create_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

/// Check that a string is a syntactically valid UID.
///
/// Components are non-empty digit runs separated by dots, without
/// leading zeros (except a lone `0`), and the total length is at most 64.
pub fn validate_uid(uid: &str) -> Result<()> {
    if uid.is_empty() || uid.len() > MAX_UID_LENGTH {
        return Err(Error::InvalidUid(format!(
            "length {} outside 1..={MAX_UID_LENGTH}",
            uid.len()
        )));
    }
    for component in uid.split('.') {
        if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidUid(uid.to_string()));
        }
        if component.len() > 1 && component.starts_with('0') {
            return Err(Error::InvalidUid(uid.to_string()));
        }
    }
    Ok(())
}

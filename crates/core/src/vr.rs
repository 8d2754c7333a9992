//! Value representation helpers shared by the JSON and XML codecs.

use crate::error::{Error, Result};
use dicom::core::VR;

/// How a value representation is carried in the metadata encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VrClass {
    Text,
    PersonName,
    IntegerString,
    DecimalString,
    Integer,
    Float,
    AttributeTag,
    Binary,
    Sequence,
}

pub(crate) fn classify(vr: VR) -> VrClass {
    match vr {
        VR::PN => VrClass::PersonName,
        VR::IS => VrClass::IntegerString,
        VR::DS => VrClass::DecimalString,
        VR::US | VR::SS | VR::UL | VR::SL | VR::SV | VR::UV => VrClass::Integer,
        VR::FL | VR::FD => VrClass::Float,
        VR::AT => VrClass::AttributeTag,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN => VrClass::Binary,
        VR::SQ => VrClass::Sequence,
        _ => VrClass::Text,
    }
}

/// Parse a two-letter VR name.
pub fn parse_vr(name: &str) -> Result<VR> {
    match name.as_bytes() {
        [a, b] => VR::from_binary([*a, *b]).ok_or_else(|| Error::InvalidVr(name.to_string())),
        _ => Err(Error::InvalidVr(name.to_string())),
    }
}

/// Two-letter name of a VR.
pub fn vr_name(vr: VR) -> String {
    let name: &str = &vr.to_string();
    name.to_string()
}

/// Pack an attribute tag into the integer form stored for AT values.
pub(crate) fn pack_tag(group: u16, element: u16) -> i64 {
    (i64::from(group) << 16) | i64::from(element)
}

/// Unpack an AT integer into its group and element.
pub(crate) fn unpack_tag(value: i64) -> (u16, u16) {
    (((value >> 16) & 0xFFFF) as u16, (value & 0xFFFF) as u16)
}

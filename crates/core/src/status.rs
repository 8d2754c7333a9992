//! Failure reason codes reported in the Failed SOP Sequence.

/// General processing failure.
pub const PROCESSING_FAILURE: u16 = 0x0110;

/// The SOP instance already exists.
pub const DUPLICATE_SOP_INSTANCE: u16 = 0x0111;

/// A required attribute is missing or inconsistent with the SOP class.
pub const IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS: u16 = 0xA900;

/// A referenced bulk data part was not transmitted.
pub const MISSING_BULKDATA: u16 = 0xA922;

/// The object could not be parsed.
pub const CANNOT_UNDERSTAND: u16 = 0xC000;

/// Short label for a failure reason, used as a metrics label.
pub fn reason_label(code: u16) -> &'static str {
    match code {
        PROCESSING_FAILURE => "processing_failure",
        DUPLICATE_SOP_INSTANCE => "duplicate_sop_instance",
        IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS => "missing_attribute",
        MISSING_BULKDATA => "missing_bulkdata",
        CANNOT_UNDERSTAND => "cannot_understand",
        _ => "other",
    }
}

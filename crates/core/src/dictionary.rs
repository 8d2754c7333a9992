//! Tag formatting and keyword lookup against the standard data dictionary.

use crate::error::{Error, Result};
use dicom::core::Tag;
use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::dictionary_std::StandardDataDictionary;

/// Keyword of a tag (e.g. `Rows`), or `Unknown` for private and unlisted tags.
pub fn keyword_of(tag: Tag) -> String {
    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| entry.alias().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Format a tag as `(gggg,eeee)` with uppercase hex digits.
pub fn tag_display(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

/// Format a tag as the eight hex digits used by DICOM JSON and XML.
pub fn tag_hex(tag: Tag) -> String {
    format!("{:04X}{:04X}", tag.group(), tag.element())
}

/// Parse eight hex digits (`GGGGEEEE`) into a tag.
pub fn parse_tag_hex(s: &str) -> Result<Tag> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidTag(s.to_string()));
    }
    let group = u16::from_str_radix(&s[..4], 16).map_err(|_| Error::InvalidTag(s.to_string()))?;
    let element =
        u16::from_str_radix(&s[4..], 16).map_err(|_| Error::InvalidTag(s.to_string()))?;
    Ok(Tag(group, element))
}

/// The `Missing <Keyword> <(gggg,eeee)>` phrase used in failure messages.
pub fn missing_attribute_message(tag: Tag) -> String {
    format!("Missing {} {}", keyword_of(tag), tag_display(tag))
}

//! Media type parsing and the bulk data lookup tables.

use crate::error::{Error, Result};
use crate::uid::{sop_class, transfer_syntax};
use std::fmt;
use std::str::FromStr;

pub const APPLICATION_DICOM: &str = "application/dicom";
pub const APPLICATION_DICOM_XML: &str = "application/dicom+xml";
pub const APPLICATION_DICOM_JSON: &str = "application/dicom+json";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const MULTIPART_RELATED: &str = "multipart/related";

/// A parsed media type: `type/subtype` plus ordered parameters.
///
/// Type, subtype and parameter names are stored lowercase. Parameter
/// values keep their case with surrounding quotes removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaType {
    type_: String,
    subtype: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    /// Parse a media type such as `multipart/related; type="application/dicom"`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut sections = split_unquoted(s, ';')
            .ok_or_else(|| Error::InvalidMediaType(s.to_string()))?
            .into_iter();
        let essence = sections.next().unwrap_or_default();
        let (type_, subtype) = essence
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidMediaType(s.to_string()))?;
        let (type_, subtype) = (type_.trim(), subtype.trim());
        if !is_token(type_) || !is_token(subtype) {
            return Err(Error::InvalidMediaType(s.to_string()));
        }

        let mut params = Vec::new();
        for section in sections {
            let section = section.trim();
            if section.is_empty() {
                continue;
            }
            let (name, value) = section
                .split_once('=')
                .ok_or_else(|| Error::InvalidMediaType(s.to_string()))?;
            let name = name.trim();
            if !is_token(name) {
                return Err(Error::InvalidMediaType(s.to_string()));
            }
            params.push((name.to_ascii_lowercase(), unquote(value.trim())));
        }

        Ok(Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params,
        })
    }

    /// The top-level type, e.g. `image`.
    pub fn type_(&self) -> &str {
        &self.type_
    }

    /// The subtype, e.g. `jpeg`.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Look up a parameter by (case-insensitive) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Compare `type/subtype` against an essence string, ignoring parameters.
    pub fn is(&self, essence: &str) -> bool {
        match essence.split_once('/') {
            Some((t, s)) => self.type_.eq_ignore_ascii_case(t) && self.subtype.eq_ignore_ascii_case(s),
            None => false,
        }
    }

    /// Whether this is `*/*` or `type/*` matching `essence`.
    pub fn accepts(&self, essence: &str) -> bool {
        if self.type_ == "*" && self.subtype == "*" {
            return true;
        }
        match essence.split_once('/') {
            Some((t, s)) => {
                self.type_.eq_ignore_ascii_case(t)
                    && (self.subtype == "*" || self.subtype.eq_ignore_ascii_case(s))
            }
            None => false,
        }
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        for (name, value) in &self.params {
            if is_token(value) {
                write!(f, ";{name}={value}")?;
            } else {
                write!(f, ";{name}=\"{}\"", value.replace('"', "\\\""))?;
            }
        }
        Ok(())
    }
}

/// Transfer syntax implied by a bulk data media type.
///
/// An explicit `transfer-syntax` parameter wins; unknown types fall back
/// to Explicit VR Little Endian.
pub fn transfer_syntax_of(media_type: &MediaType) -> String {
    if let Some(ts) = media_type.param("transfer-syntax") {
        return ts.to_string();
    }
    let ts = match (media_type.type_(), media_type.subtype()) {
        ("image", "jpeg") => transfer_syntax::JPEG_BASELINE_8BIT,
        ("image", "jls") => transfer_syntax::JPEG_LS_LOSSLESS,
        ("image", "jp2") => transfer_syntax::JPEG_2000_LOSSLESS_ONLY,
        ("image", "jpx") => transfer_syntax::JPEG_2000_PART2_LOSSLESS_ONLY,
        ("video", "mpeg") => transfer_syntax::MPEG2_MAIN_PROFILE,
        ("video", "mp4") => transfer_syntax::MPEG4_HIGH_PROFILE,
        _ => transfer_syntax::EXPLICIT_VR_LITTLE_ENDIAN,
    };
    ts.to_string()
}

/// SOP class implied by a bulk data media type, if any.
pub fn sop_class_of(media_type: &MediaType) -> Option<&'static str> {
    match (media_type.type_(), media_type.subtype()) {
        ("image", _) => Some(sop_class::VL_PHOTOGRAPHIC_IMAGE_STORAGE),
        ("video", _) => Some(sop_class::VIDEO_PHOTOGRAPHIC_IMAGE_STORAGE),
        ("application", "pdf") => Some(sop_class::ENCAPSULATED_PDF_STORAGE),
        ("text", "xml") | ("application", "xml") => Some(sop_class::ENCAPSULATED_CDA_STORAGE),
        ("model", "stl") => Some(sop_class::ENCAPSULATED_STL_STORAGE),
        _ => None,
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"'
                        | b'/' | b'[' | b']' | b'?' | b'='
                )
        })
}

fn unquote(value: &str) -> String {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => value.to_string(),
    }
}

/// Split on `sep` outside of double-quoted strings. `None` when a quoted
/// string is left open.
fn split_unquoted(s: &str, sep: char) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if in_quotes {
        return None;
    }
    parts.push(&s[start..]);
    Some(parts)
}

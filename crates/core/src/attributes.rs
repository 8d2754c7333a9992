//! The attribute tree: a tag-ordered DICOM data set with nested sequences
//! and placeholders for bulk data transmitted in separate parts.

use crate::media_type::MediaType;
use dicom::core::{Tag, VR};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A tag-ordered data set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeTree {
    elements: BTreeMap<Tag, Attribute>,
}

/// One data element: its value representation and value.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub vr: VR,
    pub value: Value,
}

/// Attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Zero-length value.
    Empty,
    /// Character string values (one per value multiplicity).
    Strings(Vec<String>),
    /// Binary integer values (US, SS, UL, SL, SV, UV, AT).
    Ints(Vec<i64>),
    /// Binary floating point values (FL, FD).
    Floats(Vec<f64>),
    /// Inline binary value (OB, OW, UN, ...).
    Bytes(Vec<u8>),
    /// Reference to a bulk data part.
    BulkData(BulkData),
    /// Encapsulated pixel data fragments.
    Fragments(Vec<Fragment>),
    /// Sequence of items.
    Sequence(Vec<AttributeTree>),
}

/// One fragment of encapsulated pixel data.
#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    Bytes(Vec<u8>),
    BulkData(BulkData),
}

/// A bulk data reference, resolved once its payload has been located in the spool.
#[derive(Clone, Debug, PartialEq)]
pub struct BulkData {
    /// Reference string, as found in the metadata document.
    pub uri: String,
    /// Spooled payload backing this reference, once resolved.
    pub payload: Option<SpooledPayload>,
}

/// A payload written to the request spool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpooledPayload {
    pub path: PathBuf,
    pub media_type: MediaType,
    pub length: u64,
}

impl BulkData {
    /// An unresolved placeholder.
    pub fn placeholder(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            payload: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.payload.is_some()
    }
}

impl Value {
    /// Whether the value carries no data.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Strings(v) => v.iter().all(|s| s.trim_end_matches([' ', '\0']).is_empty()),
            Value::Ints(v) => v.is_empty(),
            Value::Floats(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::BulkData(_) => false,
            Value::Fragments(v) => v.is_empty(),
            Value::Sequence(v) => v.is_empty(),
        }
    }
}

impl Attribute {
    pub fn new(vr: VR, value: Value) -> Self {
        Self { vr, value }
    }
}

impl AttributeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, tag: Tag) -> Option<&Attribute> {
        self.elements.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    /// Whether the tag is present with a non-empty value.
    pub fn contains_value(&self, tag: Tag) -> bool {
        self.get(tag).is_some_and(|a| !a.value.is_empty())
    }

    /// Insert an attribute, returning the previous one.
    pub fn insert(&mut self, tag: Tag, vr: VR, value: Value) -> Option<Attribute> {
        self.elements.insert(tag, Attribute::new(vr, value))
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Attribute> {
        self.elements.remove(&tag)
    }

    /// Set a single string value.
    pub fn set_string(&mut self, tag: Tag, vr: VR, value: impl Into<String>) {
        self.insert(tag, vr, Value::Strings(vec![value.into()]));
    }

    /// Set a single integer value.
    ///
    /// Integer strings (IS) are stored in their character form.
    pub fn set_int(&mut self, tag: Tag, vr: VR, value: i64) {
        let value = match vr {
            VR::IS => Value::Strings(vec![value.to_string()]),
            _ => Value::Ints(vec![value]),
        };
        self.insert(tag, vr, value);
    }

    /// First string value with DICOM padding removed.
    pub fn get_string(&self, tag: Tag) -> Option<&str> {
        match &self.get(tag)?.value {
            Value::Strings(values) => values
                .first()
                .map(|s| s.trim_end_matches([' ', '\0']))
                .filter(|s| !s.is_empty()),
            _ => None,
        }
    }

    /// First value as an integer, parsing integer strings.
    pub fn get_int(&self, tag: Tag) -> Option<i64> {
        match &self.get(tag)?.value {
            Value::Ints(values) => values.first().copied(),
            Value::Strings(values) => values.first()?.trim().parse().ok(),
            _ => None,
        }
    }

    /// Iterate attributes in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Attribute)> {
        self.elements.iter().map(|(tag, attr)| (*tag, attr))
    }

    /// Copy attributes from `other` for every tag that has no value here.
    pub fn merge_missing(&mut self, other: AttributeTree) {
        for (tag, attr) in other.elements {
            if !self.contains_value(tag) {
                self.elements.insert(tag, attr);
            }
        }
    }

    /// Visit every attribute depth-first, descending into sequence items
    /// after the sequence attribute itself has been visited.
    pub fn walk_mut<E, F>(&mut self, visit: &mut F) -> Result<(), E>
    where
        F: FnMut(Tag, &mut Attribute) -> Result<(), E>,
    {
        for (tag, attr) in self.elements.iter_mut() {
            visit(*tag, attr)?;
            if let Value::Sequence(items) = &mut attr.value {
                for item in items {
                    item.walk_mut(visit)?;
                }
            }
        }
        Ok(())
    }

    /// Collect every bulk data reference in the tree, including fragments
    /// and sequence items.
    pub fn bulk_data(&self) -> Vec<(Tag, &BulkData)> {
        fn collect<'a>(tree: &'a AttributeTree, out: &mut Vec<(Tag, &'a BulkData)>) {
            for (tag, attr) in &tree.elements {
                match &attr.value {
                    Value::BulkData(bulk) => out.push((*tag, bulk)),
                    Value::Fragments(fragments) => {
                        out.extend(fragments.iter().filter_map(|f| match f {
                            Fragment::BulkData(bulk) => Some((*tag, bulk)),
                            Fragment::Bytes(_) => None,
                        }))
                    }
                    Value::Sequence(items) => {
                        for item in items {
                            collect(item, out);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }
}

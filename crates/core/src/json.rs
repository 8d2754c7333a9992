//! DICOM JSON Model (PS3.18 Annex F) reading and writing.

use crate::attributes::{AttributeTree, BulkData, Fragment, Value};
use crate::dictionary::{parse_tag_hex, tag_hex};
use crate::error::{Error, Result};
use crate::vr::{VrClass, classify, pack_tag, parse_vr, unpack_tag, vr_name};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value as Json};

const PN_GROUPS: [&str; 3] = ["Alphabetic", "Ideographic", "Phonetic"];

/// Parse a DICOM JSON document: either one data set object or an array of them.
pub fn read_datasets(input: &[u8]) -> Result<Vec<AttributeTree>> {
    let doc: Json = serde_json::from_slice(input).map_err(|e| Error::Json(e.to_string()))?;
    match &doc {
        Json::Array(items) => items.iter().map(parse_dataset).collect(),
        Json::Object(_) => Ok(vec![parse_dataset(&doc)?]),
        _ => Err(Error::Json(
            "expected a data set object or an array of data sets".to_string(),
        )),
    }
}

/// Convert a data set into its DICOM JSON object.
pub fn to_json(tree: &AttributeTree) -> Json {
    let mut object = Map::new();
    for (tag, attr) in tree.iter() {
        let mut element = Map::new();
        element.insert("vr".to_string(), Json::String(vr_name(attr.vr)));
        let class = classify(attr.vr);
        match &attr.value {
            Value::Empty => {}
            Value::Strings(values) => {
                let values = values.iter().map(|s| string_to_json(class, s)).collect();
                element.insert("Value".to_string(), Json::Array(values));
            }
            Value::Ints(values) => {
                let values = values
                    .iter()
                    .map(|v| match class {
                        VrClass::AttributeTag => {
                            let (group, element) = unpack_tag(*v);
                            Json::String(format!("{group:04X}{element:04X}"))
                        }
                        _ => Json::Number(Number::from(*v)),
                    })
                    .collect();
                element.insert("Value".to_string(), Json::Array(values));
            }
            Value::Floats(values) => {
                let values = values
                    .iter()
                    .map(|v| Number::from_f64(*v).map_or(Json::Null, Json::Number))
                    .collect();
                element.insert("Value".to_string(), Json::Array(values));
            }
            Value::Bytes(bytes) => {
                element.insert("InlineBinary".to_string(), Json::String(STANDARD.encode(bytes)));
            }
            Value::BulkData(bulk) => {
                element.insert("BulkDataURI".to_string(), Json::String(bulk.uri.clone()));
            }
            Value::Fragments(fragments) => {
                let bulk = fragments.iter().find_map(|f| match f {
                    Fragment::BulkData(bulk) => Some(bulk),
                    Fragment::Bytes(_) => None,
                });
                match bulk {
                    Some(bulk) => {
                        element.insert("BulkDataURI".to_string(), Json::String(bulk.uri.clone()));
                    }
                    None => {
                        let bytes: Vec<u8> = fragments
                            .iter()
                            .flat_map(|f| match f {
                                Fragment::Bytes(b) => b.as_slice(),
                                Fragment::BulkData(_) => &[][..],
                            })
                            .copied()
                            .collect();
                        element
                            .insert("InlineBinary".to_string(), Json::String(STANDARD.encode(bytes)));
                    }
                }
            }
            Value::Sequence(items) => {
                let items = items.iter().map(to_json).collect();
                element.insert("Value".to_string(), Json::Array(items));
            }
        }
        object.insert(tag_hex(tag), Json::Object(element));
    }
    Json::Object(object)
}

/// Serialize a data set as DICOM JSON bytes.
pub fn write_dataset(tree: &AttributeTree) -> Result<Vec<u8>> {
    serde_json::to_vec(&to_json(tree)).map_err(|e| Error::Serialization(e.to_string()))
}

fn parse_dataset(doc: &Json) -> Result<AttributeTree> {
    let object = match doc {
        Json::Object(object) => object,
        Json::Null => return Ok(AttributeTree::new()),
        _ => return Err(Error::Json("data set must be a JSON object".to_string())),
    };

    let mut tree = AttributeTree::new();
    for (key, element) in object {
        let tag = parse_tag_hex(key)?;
        let element = element
            .as_object()
            .ok_or_else(|| Error::Json(format!("attribute {key} must be an object")))?;
        let vr = element
            .get("vr")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::Json(format!("attribute {key} has no vr")))?;
        let vr = parse_vr(vr)?;
        tree.insert(tag, vr, parse_value(key, classify(vr), element)?);
    }
    Ok(tree)
}

fn parse_value(key: &str, class: VrClass, element: &Map<String, Json>) -> Result<Value> {
    if let Some(uri) = element.get("BulkDataURI") {
        let uri = uri
            .as_str()
            .ok_or_else(|| Error::Json(format!("attribute {key}: BulkDataURI must be a string")))?;
        return Ok(Value::BulkData(BulkData::placeholder(uri)));
    }
    if let Some(inline) = element.get("InlineBinary") {
        let encoded = inline
            .as_str()
            .ok_or_else(|| Error::Json(format!("attribute {key}: InlineBinary must be a string")))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| Error::Json(format!("attribute {key}: {e}")))?;
        return Ok(Value::Bytes(bytes));
    }
    let Some(values) = element.get("Value") else {
        return Ok(Value::Empty);
    };
    let values = values
        .as_array()
        .ok_or_else(|| Error::Json(format!("attribute {key}: Value must be an array")))?;
    if values.is_empty() {
        return Ok(Value::Empty);
    }

    let invalid = |what: &str| Error::Json(format!("attribute {key}: invalid {what} value"));
    let value = match class {
        VrClass::Sequence => Value::Sequence(
            values
                .iter()
                .map(parse_dataset)
                .collect::<Result<Vec<_>>>()?,
        ),
        VrClass::PersonName => Value::Strings(
            values
                .iter()
                .map(|v| person_name_from_json(v).ok_or_else(|| invalid("person name")))
                .collect::<Result<Vec<_>>>()?,
        ),
        VrClass::Text => Value::Strings(
            values
                .iter()
                .map(|v| match v {
                    Json::String(s) => Ok(s.clone()),
                    Json::Null => Ok(String::new()),
                    _ => Err(invalid("string")),
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        VrClass::IntegerString | VrClass::DecimalString => Value::Strings(
            values
                .iter()
                .map(|v| match v {
                    Json::Number(n) => Ok(n.to_string()),
                    Json::String(s) => Ok(s.clone()),
                    Json::Null => Ok(String::new()),
                    _ => Err(invalid("numeric string")),
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        // Binary numbers have no empty form; null entries are dropped.
        VrClass::Integer => {
            let ints = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| {
                    v.as_i64()
                        .or_else(|| v.as_u64().and_then(|u| i64::try_from(u).ok()))
                        .ok_or_else(|| invalid("integer"))
                })
                .collect::<Result<Vec<_>>>()?;
            if ints.is_empty() { Value::Empty } else { Value::Ints(ints) }
        }
        VrClass::Float => {
            let floats = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| v.as_f64().ok_or_else(|| invalid("float")))
                .collect::<Result<Vec<_>>>()?;
            if floats.is_empty() { Value::Empty } else { Value::Floats(floats) }
        }
        VrClass::AttributeTag => Value::Ints(
            values
                .iter()
                .map(|v| -> Result<i64> {
                    let tag = parse_tag_hex(v.as_str().ok_or_else(|| invalid("tag"))?)?;
                    Ok(pack_tag(tag.group(), tag.element()))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        VrClass::Binary => return Err(invalid("binary")),
    };
    Ok(value)
}

fn person_name_from_json(value: &Json) -> Option<String> {
    match value {
        Json::Null => Some(String::new()),
        Json::Object(groups) => {
            let mut parts: Vec<&str> = PN_GROUPS
                .iter()
                .map(|g| groups.get(*g).and_then(Json::as_str).unwrap_or(""))
                .collect();
            while parts.last().is_some_and(|p| p.is_empty()) {
                parts.pop();
            }
            Some(parts.join("="))
        }
        _ => None,
    }
}

fn string_to_json(class: VrClass, value: &str) -> Json {
    let trimmed = value.trim_matches([' ', '\0']);
    match class {
        _ if trimmed.is_empty() => Json::Null,
        VrClass::PersonName => {
            let mut groups = Map::new();
            for (name, part) in PN_GROUPS.iter().zip(trimmed.split('=')) {
                if !part.is_empty() {
                    groups.insert((*name).to_string(), Json::String(part.to_string()));
                }
            }
            Json::Object(groups)
        }
        VrClass::IntegerString => trimmed
            .parse::<i64>()
            .map_or_else(|_| Json::String(trimmed.to_string()), |v| Json::Number(v.into())),
        VrClass::DecimalString => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| Json::String(trimmed.to_string()), Json::Number),
        _ => Json::String(value.trim_end_matches([' ', '\0']).to_string()),
    }
}

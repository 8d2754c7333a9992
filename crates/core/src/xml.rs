//! Native DICOM Model (PS3.19 Annex A.1) reading and writing.

use crate::attributes::{AttributeTree, BulkData, Fragment, Value};
use crate::dictionary::{keyword_of, parse_tag_hex, tag_hex};
use crate::error::{Error, Result};
use crate::vr::{VrClass, classify, pack_tag, parse_vr, unpack_tag, vr_name};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dicom::core::{Tag, VR};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

const PN_GROUPS: [&str; 3] = ["Alphabetic", "Ideographic", "Phonetic"];
const PN_COMPONENTS: [&str; 5] = [
    "FamilyName",
    "GivenName",
    "MiddleName",
    "NamePrefix",
    "NameSuffix",
];

/// An attribute whose element has been opened but not yet closed.
struct OpenAttribute {
    tag: Tag,
    vr: VR,
    values: Vec<String>,
    bulk_data: Option<String>,
    inline: Option<Vec<u8>>,
    items: Vec<AttributeTree>,
}

/// Person name being assembled from `PersonName` child elements.
#[derive(Default)]
struct OpenPersonName {
    number: Option<usize>,
    groups: [String; 3],
    components: [String; 5],
}

/// Which text node is being collected.
#[derive(Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Value(Option<usize>),
    InlineBinary,
    Component(usize),
}

/// Parse one Native DICOM Model document into a data set.
pub fn read_dataset(input: &[u8]) -> Result<AttributeTree> {
    let text = std::str::from_utf8(input).map_err(|e| Error::Xml(e.to_string()))?;
    let mut reader = Reader::from_str(text);

    let mut datasets: Vec<AttributeTree> = Vec::new();
    let mut open: Vec<OpenAttribute> = Vec::new();
    let mut person_name: Option<OpenPersonName> = None;
    let mut target: Option<TextTarget> = None;
    let mut text_buf = String::new();
    let mut root: Option<AttributeTree> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::Xml(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local_name = e.local_name();
                let attrs = read_attributes(e)?;
                match local_name.as_ref() {
                    b"NativeDicomModel" => {
                        if root.is_some() || !datasets.is_empty() {
                            return Err(Error::Xml("nested NativeDicomModel".to_string()));
                        }
                        datasets.push(AttributeTree::new());
                        if is_empty {
                            root = datasets.pop();
                        }
                    }
                    b"DicomAttribute" => {
                        if datasets.is_empty() {
                            return Err(Error::Xml("DicomAttribute outside a data set".to_string()));
                        }
                        let tag = attrs
                            .iter()
                            .find(|(k, _)| k == "tag")
                            .map(|(_, v)| v.as_str())
                            .ok_or_else(|| Error::Xml("DicomAttribute without tag".to_string()))?;
                        let vr = attrs
                            .iter()
                            .find(|(k, _)| k == "vr")
                            .map(|(_, v)| v.as_str())
                            .ok_or_else(|| Error::Xml(format!("attribute {tag} without vr")))?;
                        let attribute = OpenAttribute {
                            tag: parse_tag_hex(tag)?,
                            vr: parse_vr(vr)?,
                            values: Vec::new(),
                            bulk_data: None,
                            inline: None,
                            items: Vec::new(),
                        };
                        if is_empty {
                            close_attribute(attribute, &mut datasets)?;
                        } else {
                            open.push(attribute);
                        }
                    }
                    b"Item" => {
                        if open.is_empty() {
                            return Err(Error::Xml("Item outside a DicomAttribute".to_string()));
                        }
                        if is_empty {
                            if let Some(attr) = open.last_mut() {
                                attr.items.push(AttributeTree::new());
                            }
                        } else {
                            datasets.push(AttributeTree::new());
                        }
                    }
                    b"Value" => {
                        let number = number_attribute(&attrs)?;
                        if is_empty {
                            push_value(&mut open, number, String::new())?;
                        } else {
                            target = Some(TextTarget::Value(number));
                            text_buf.clear();
                        }
                    }
                    b"InlineBinary" => {
                        target = Some(TextTarget::InlineBinary);
                        text_buf.clear();
                        if is_empty {
                            set_inline(&mut open, "")?;
                            target = None;
                        }
                    }
                    b"BulkData" => {
                        let uri = attrs
                            .iter()
                            .find(|(k, _)| k == "uri" || k == "uuid")
                            .map(|(_, v)| v.clone())
                            .ok_or_else(|| Error::Xml("BulkData without uri".to_string()))?;
                        let attr = open
                            .last_mut()
                            .ok_or_else(|| Error::Xml("BulkData outside a DicomAttribute".to_string()))?;
                        attr.bulk_data = Some(uri);
                    }
                    b"PersonName" => {
                        let name = OpenPersonName {
                            number: number_attribute(&attrs)?,
                            ..OpenPersonName::default()
                        };
                        if is_empty {
                            push_value(&mut open, name.number, String::new())?;
                        } else {
                            person_name = Some(name);
                        }
                    }
                    other => {
                        if let Some(pn) = person_name.as_mut() {
                            if PN_GROUPS.iter().any(|g| g.as_bytes() == other) {
                                pn.components = Default::default();
                            } else if let Some(component) =
                                PN_COMPONENTS.iter().position(|c| c.as_bytes() == other)
                                && !is_empty
                            {
                                target = Some(TextTarget::Component(component));
                                text_buf.clear();
                            }
                        }
                    }
                }
            }
            Event::Text(ref e) => {
                if target.is_some() {
                    let text = e.unescape().map_err(|e| Error::Xml(e.to_string()))?;
                    text_buf.push_str(&text);
                }
            }
            Event::CData(ref e) => {
                if target.is_some() {
                    text_buf.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(ref e) => {
                let local_name = e.local_name();
                match local_name.as_ref() {
                    b"NativeDicomModel" => {
                        root = datasets.pop();
                    }
                    b"DicomAttribute" => {
                        let attribute = open
                            .pop()
                            .ok_or_else(|| Error::Xml("unbalanced DicomAttribute".to_string()))?;
                        close_attribute(attribute, &mut datasets)?;
                    }
                    b"Item" => {
                        let item = datasets
                            .pop()
                            .ok_or_else(|| Error::Xml("unbalanced Item".to_string()))?;
                        let attr = open
                            .last_mut()
                            .ok_or_else(|| Error::Xml("Item outside a DicomAttribute".to_string()))?;
                        attr.items.push(item);
                    }
                    b"Value" => {
                        if let Some(TextTarget::Value(number)) = target.take() {
                            push_value(&mut open, number, std::mem::take(&mut text_buf))?;
                        }
                    }
                    b"InlineBinary" => {
                        if target.take() == Some(TextTarget::InlineBinary) {
                            let encoded = std::mem::take(&mut text_buf);
                            set_inline(&mut open, &encoded)?;
                        }
                    }
                    b"PersonName" => {
                        if let Some(pn) = person_name.take() {
                            push_value(&mut open, pn.number, join_trimmed(&pn.groups, '='))?;
                        }
                    }
                    other => {
                        if let Some(pn) = person_name.as_mut() {
                            if let Some(TextTarget::Component(component)) = target
                                && PN_COMPONENTS[component].as_bytes() == other
                            {
                                pn.components[component] = std::mem::take(&mut text_buf);
                                target = None;
                            } else if let Some(group) =
                                PN_GROUPS.iter().position(|g| g.as_bytes() == other)
                            {
                                pn.groups[group] = join_trimmed(&pn.components, '^');
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() || !datasets.is_empty() {
        return Err(Error::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| Error::Xml("missing NativeDicomModel element".to_string()))
}

/// Serialize a data set as a Native DICOM Model document.
pub fn write_dataset(tree: &AttributeTree) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    write_event(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    write_event(
        &mut writer,
        Event::Start(
            BytesStart::new("NativeDicomModel").with_attributes([("xml:space", "preserve")]),
        ),
    )?;
    write_attributes(&mut writer, tree)?;
    write_event(&mut writer, Event::End(BytesEnd::new("NativeDicomModel")))?;
    Ok(writer.into_inner())
}

fn write_attributes(writer: &mut Writer<Vec<u8>>, tree: &AttributeTree) -> Result<()> {
    for (tag, attr) in tree.iter() {
        let tag_str = tag_hex(tag);
        let vr_str = vr_name(attr.vr);
        let keyword = keyword_of(tag);
        let mut start = BytesStart::new("DicomAttribute");
        start.push_attribute(("tag", tag_str.as_str()));
        start.push_attribute(("vr", vr_str.as_str()));
        if keyword != "Unknown" {
            start.push_attribute(("keyword", keyword.as_str()));
        }
        write_event(writer, Event::Start(start))?;

        let class = classify(attr.vr);
        match &attr.value {
            Value::Empty => {}
            Value::Strings(values) => {
                for (index, value) in values.iter().enumerate() {
                    let number = (index + 1).to_string();
                    if class == VrClass::PersonName {
                        write_person_name(writer, &number, value)?;
                    } else {
                        let value = value.trim_end_matches([' ', '\0']);
                        write_value(writer, &number, value)?;
                    }
                }
            }
            Value::Ints(values) => {
                for (index, value) in values.iter().enumerate() {
                    let text = match class {
                        VrClass::AttributeTag => {
                            let (group, element) = unpack_tag(*value);
                            format!("{group:04X}{element:04X}")
                        }
                        _ => value.to_string(),
                    };
                    write_value(writer, &(index + 1).to_string(), &text)?;
                }
            }
            Value::Floats(values) => {
                for (index, value) in values.iter().enumerate() {
                    write_value(writer, &(index + 1).to_string(), &value.to_string())?;
                }
            }
            Value::Bytes(bytes) => write_text_element(writer, "InlineBinary", &STANDARD.encode(bytes))?,
            Value::BulkData(bulk) => write_bulk_data(writer, &bulk.uri)?,
            Value::Fragments(fragments) => {
                let bulk = fragments.iter().find_map(|f| match f {
                    Fragment::BulkData(bulk) => Some(bulk),
                    Fragment::Bytes(_) => None,
                });
                if let Some(bulk) = bulk {
                    write_bulk_data(writer, &bulk.uri)?;
                }
            }
            Value::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    let number = (index + 1).to_string();
                    write_event(
                        writer,
                        Event::Start(BytesStart::new("Item").with_attributes([("number", number.as_str())])),
                    )?;
                    write_attributes(writer, item)?;
                    write_event(writer, Event::End(BytesEnd::new("Item")))?;
                }
            }
        }

        write_event(writer, Event::End(BytesEnd::new("DicomAttribute")))?;
    }
    Ok(())
}

fn write_value(writer: &mut Writer<Vec<u8>>, number: &str, text: &str) -> Result<()> {
    write_event(
        writer,
        Event::Start(BytesStart::new("Value").with_attributes([("number", number)])),
    )?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new("Value")))
}

fn write_person_name(writer: &mut Writer<Vec<u8>>, number: &str, value: &str) -> Result<()> {
    write_event(
        writer,
        Event::Start(BytesStart::new("PersonName").with_attributes([("number", number)])),
    )?;
    for (group, part) in PN_GROUPS.iter().zip(value.split('=')) {
        if part.is_empty() {
            continue;
        }
        write_event(writer, Event::Start(BytesStart::new(*group)))?;
        for (component, text) in PN_COMPONENTS.iter().zip(part.split('^')) {
            if !text.is_empty() {
                write_text_element(writer, component, text)?;
            }
        }
        write_event(writer, Event::End(BytesEnd::new(*group)))?;
    }
    write_event(writer, Event::End(BytesEnd::new("PersonName")))
}

fn write_bulk_data(writer: &mut Writer<Vec<u8>>, uri: &str) -> Result<()> {
    write_event(
        writer,
        Event::Empty(BytesStart::new("BulkData").with_attributes([("uri", uri)])),
    )
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Serialization(e.to_string()))
}

fn read_attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(e.to_string()))?
            .into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn number_attribute(attrs: &[(String, String)]) -> Result<Option<usize>> {
    match attrs.iter().find(|(k, _)| k == "number") {
        Some((_, v)) => match v.trim().parse::<usize>() {
            Ok(n) if n >= 1 => Ok(Some(n)),
            _ => Err(Error::Xml(format!("invalid value number {v:?}"))),
        },
        None => Ok(None),
    }
}

fn push_value(open: &mut [OpenAttribute], number: Option<usize>, text: String) -> Result<()> {
    let attr = open
        .last_mut()
        .ok_or_else(|| Error::Xml("Value outside a DicomAttribute".to_string()))?;
    match number {
        Some(n) => {
            if attr.values.len() < n {
                attr.values.resize(n, String::new());
            }
            attr.values[n - 1] = text;
        }
        None => attr.values.push(text),
    }
    Ok(())
}

fn set_inline(open: &mut [OpenAttribute], encoded: &str) -> Result<()> {
    let attr = open
        .last_mut()
        .ok_or_else(|| Error::Xml("InlineBinary outside a DicomAttribute".to_string()))?;
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| Error::Xml(format!("attribute {}: {e}", tag_hex(attr.tag))))?;
    attr.inline = Some(bytes);
    Ok(())
}

fn close_attribute(attr: OpenAttribute, datasets: &mut [AttributeTree]) -> Result<()> {
    let tag = tag_hex(attr.tag);
    let value = if let Some(uri) = attr.bulk_data {
        Value::BulkData(BulkData::placeholder(uri))
    } else if let Some(bytes) = attr.inline {
        Value::Bytes(bytes)
    } else if !attr.items.is_empty() {
        Value::Sequence(attr.items)
    } else if attr.values.is_empty() {
        Value::Empty
    } else {
        typed_value(&tag, attr.vr, attr.values)?
    };
    let dataset = datasets
        .last_mut()
        .ok_or_else(|| Error::Xml("DicomAttribute outside a data set".to_string()))?;
    dataset.insert(attr.tag, attr.vr, value);
    Ok(())
}

fn typed_value(tag: &str, vr: VR, values: Vec<String>) -> Result<Value> {
    let invalid = |v: &str| Error::Xml(format!("attribute {tag}: invalid value {v:?}"));
    let value = match classify(vr) {
        VrClass::Integer => Value::Ints(
            values
                .iter()
                .map(|v| v.trim().parse::<i64>().map_err(|_| invalid(v)))
                .collect::<Result<Vec<_>>>()?,
        ),
        VrClass::Float => Value::Floats(
            values
                .iter()
                .map(|v| v.trim().parse::<f64>().map_err(|_| invalid(v)))
                .collect::<Result<Vec<_>>>()?,
        ),
        VrClass::AttributeTag => Value::Ints(
            values
                .iter()
                .map(|v| -> Result<i64> {
                    let tag = parse_tag_hex(v.trim())?;
                    Ok(pack_tag(tag.group(), tag.element()))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        VrClass::Binary | VrClass::Sequence => return Err(invalid("<text>")),
        _ => Value::Strings(values),
    };
    Ok(value)
}

fn join_trimmed(parts: &[String], sep: char) -> String {
    let end = parts
        .iter()
        .rposition(|p| !p.is_empty())
        .map_or(0, |i| i + 1);
    parts[..end].join(&sep.to_string())
}

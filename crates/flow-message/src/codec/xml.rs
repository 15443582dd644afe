//! Simple XML documents, addressed by slash-separated element path.
//!
//! ```text
//! /root/foo/bar
//! /root/foo[2]/bar
//! /root/foo/@attr
//! ```
//!
//! Every element is held as a map of `@attribute` entries, child elements and
//! its trimmed text under [`TEXT`]. Repeated sibling names become a list.
//! Mixed content and element order are not preserved. Document type
//! declarations are dropped unread, along with references to any entity
//! other than the predefined five.

use super::Codec;
use crate::engine::{leaves, traverse, Path, Walk};
use crate::error::{MessageError, Result};
use crate::ledger::Update;
use crate::value::{FieldValue, Map, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};

/// Address of the version attribute in the XML declaration.
pub const HEADER_VERSION: &str = "xml header version";
/// Address of the encoding attribute in the XML declaration.
pub const HEADER_ENCODING: &str = "xml header encoding";

/// Key of an element's text content. `#` cannot start an XML name.
const TEXT: &str = "#text";

static DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<\?xml\s([^?]*)\?>").expect("valid regex"));
static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"version\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static ENCODING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"encoding\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static DOCTYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!DOCTYPE[^\[>]*(?:\[.*?\])?\s*>").expect("valid regex")
});
static ENTITY_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&([A-Za-z_:][\w.:-]*);").expect("valid regex"));

pub struct XmlCodec;

impl XmlCodec {
    fn path(field: &str, deletion: bool) -> Result<Path> {
        let mut elements: Vec<&str> = field.split('/').skip_while(|e| e.is_empty()).collect();
        if let Some(&last) = elements.last() {
            if !deletion && !last.starts_with('@') && !is_header(last) {
                elements.push(TEXT);
            }
        }
        Path::parse(Self::NAME, field, elements)
    }

    /// Elements are name to `{attributes, text, children}` rather than name to
    /// value, so structured values are split into one update per leaf.
    fn flatten(field: &str, value: FieldValue, out: &mut Vec<Update>) -> Result<()> {
        match value {
            FieldValue::Delete | FieldValue::Value(Value::Null) => {
                Self::path(field, true)?;
                out.push(Update::Delete {
                    field: field.to_owned(),
                });
            }
            FieldValue::EmptyMap | FieldValue::EmptyList => {}
            FieldValue::Value(Value::Map(map)) => {
                for (key, child) in map {
                    Self::flatten(&format!("{field}/{key}"), FieldValue::Value(child), out)?;
                }
            }
            FieldValue::Value(Value::List(list)) => {
                for (index, child) in list.into_iter().enumerate() {
                    Self::flatten(&format!("{field}[{index}]"), FieldValue::Value(child), out)?;
                }
            }
            FieldValue::Value(Value::Bytes(_)) => {
                return Err(MessageError::invalid_value(Self::NAME, field, "bytes"));
            }
            FieldValue::NonFinite(_) => {
                return Err(MessageError::invalid_value(Self::NAME, field, "non-finite number"));
            }
            FieldValue::Value(scalar) => {
                Self::path(field, false)?;
                out.push(Update::Set {
                    field: field.to_owned(),
                    value: FieldValue::Value(Value::Text(scalar.to_string())),
                });
            }
        }
        Ok(())
    }
}

fn is_header(key: &str) -> bool {
    key == HEADER_VERSION || key == HEADER_ENCODING
}

impl Codec for XmlCodec {
    type Repr = Map;

    const NAME: &'static str = "xml";

    fn empty() -> Map {
        Map::new()
    }

    fn parse(bytes: &[u8]) -> Result<Map> {
        let mut roots = Map::new();
        if bytes.is_empty() {
            return Ok(roots);
        }

        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
        let mut encoding = None;
        if let Some(declaration) = DECLARATION.captures(&head) {
            let attributes = &declaration[1];
            if let Some(v) = VERSION.captures(attributes) {
                roots.insert(HEADER_VERSION.to_owned(), Value::Text(v[1].to_owned()));
            }
            if let Some(e) = ENCODING.captures(attributes) {
                roots.insert(HEADER_ENCODING.to_owned(), Value::Text(e[1].to_owned()));
                encoding = Some(e[1].to_owned());
            }
        }

        let text = without_dtd(&decode(bytes, encoding.as_deref())?);
        let package = sxd_document::parser::parse(&text)
            .map_err(|e| MessageError::parse(Self::NAME, bytes, format!("{e:?}")))?;
        for child in package.as_document().root().children() {
            if let ChildOfRoot::Element(element) = child {
                read_element(element, &mut roots);
            }
        }
        Ok(roots)
    }

    fn validate(field: &str, value: &FieldValue) -> Result<()> {
        Self::flatten(field, value.clone(), &mut Vec::new())
    }

    fn prepare(field: &str, value: FieldValue) -> Result<Vec<Update>> {
        let mut updates = Vec::new();
        Self::flatten(field, value, &mut updates)?;
        Ok(updates)
    }

    fn apply(repr: &mut Map, update: &Update) -> Result<()> {
        let field = update.field();
        let path = Self::path(field, update.is_delete())?;
        match update.value().and_then(FieldValue::as_value) {
            Some(value) => {
                let list_value = value.clone();
                traverse(
                    repr,
                    &path,
                    Walk::WRITE.promoting(),
                    |map, key| {
                        map.insert(key.to_owned(), value.clone());
                    },
                    |list, index| list[index] = list_value,
                )
            }
            None => traverse(
                repr,
                &path,
                Walk::READ.promoting(),
                |map, key| {
                    map.remove(key);
                },
                |list, index| {
                    list.remove(index);
                },
            ),
        }
        .map_err(|c| c.into_error(field))?;
        Ok(())
    }

    fn access(repr: &Map, field: &str) -> Result<Option<Value>> {
        let path = Self::path(field, false)?;
        let mut data = repr.clone();
        let found = traverse(
            &mut data,
            &path,
            Walk::READ.promoting(),
            |map, key| map.get(key).cloned(),
            |list, index| list.get(index).cloned(),
        )
        .map_err(|c| c.into_error(field))?;
        Ok(found.flatten())
    }

    fn fields(repr: &Map) -> BTreeSet<String> {
        let suffix = format!("/{TEXT}");
        let data = Value::Map(repr.clone());
        leaves(&data, "/")
            .into_iter()
            .map(|(path, _)| format!("/{}", path.replace(&suffix, "")))
            .collect()
    }

    fn serialize(repr: &Map) -> Result<Vec<u8>> {
        let document = write_documents(repr, false)?;
        match repr.get(HEADER_ENCODING).and_then(Value::as_str) {
            Some(encoding) => encode(&document, encoding),
            None => Ok(document.into_bytes()),
        }
    }

    fn render(repr: &Map) -> Result<String> {
        write_documents(repr, true)
    }
}

/// Removes the document type declaration and any reference to an entity it
/// might have declared. Nothing external is ever resolved.
fn without_dtd(text: &str) -> String {
    let text = DOCTYPE.replace(text, "");
    ENTITY_REF
        .replace_all(&text, |caps: &regex::Captures<'_>| match &caps[1] {
            "lt" | "gt" | "amp" | "quot" | "apos" => caps[0].to_owned(),
            _ => String::new(),
        })
        .into_owned()
}

fn read_element(element: Element<'_>, parent: &mut Map) {
    let mut data = Map::new();
    for attribute in element.attributes() {
        data.insert(
            format!("@{}", attribute.name().local_part()),
            Value::Text(attribute.value().to_owned()),
        );
    }
    let mut text = String::new();
    for child in element.children() {
        match child {
            ChildOfElement::Element(e) => read_element(e, &mut data),
            ChildOfElement::Text(t) => text.push_str(t.text()),
            _ => {}
        }
    }
    data.insert(TEXT.to_owned(), Value::Text(text.trim().to_owned()));

    let name = element.name().local_part().to_owned();
    let merged = match parent.remove(&name) {
        Some(Value::Map(sibling)) => Value::List(vec![Value::Map(sibling), Value::Map(data)]),
        Some(Value::List(mut siblings)) => {
            siblings.push(Value::Map(data));
            Value::List(siblings)
        }
        _ => Value::Map(data),
    };
    parent.insert(name, merged);
}

fn charset(encoding: &str) -> Option<Charset> {
    match encoding.to_ascii_uppercase().as_str() {
        "UTF-8" | "UTF8" => Some(Charset::Utf8),
        "US-ASCII" | "ASCII" => Some(Charset::Ascii),
        "ISO-8859-1" | "ISO8859-1" | "LATIN1" => Some(Charset::Latin1),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Charset {
    Utf8,
    Ascii,
    Latin1,
}

fn decode(bytes: &[u8], encoding: Option<&str>) -> Result<String> {
    let charset = match encoding {
        None => Charset::Utf8,
        Some(name) => charset(name).ok_or_else(|| {
            MessageError::parse(XmlCodec::NAME, bytes, format!("unsupported encoding '{name}'"))
        })?,
    };
    match charset {
        Charset::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        Charset::Ascii if !bytes.is_ascii() => Err(MessageError::parse(
            XmlCodec::NAME,
            bytes,
            "non-ASCII content in a US-ASCII document",
        )),
        Charset::Ascii | Charset::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| MessageError::parse(XmlCodec::NAME, bytes, e)),
    }
}

fn encode(document: &str, encoding: &str) -> Result<Vec<u8>> {
    let unencodable = |c: char| {
        MessageError::serialization(
            document,
            format!("'{c}' cannot be encoded in '{encoding}'"),
        )
    };
    match charset(encoding) {
        Some(Charset::Utf8) => Ok(document.as_bytes().to_vec()),
        Some(Charset::Ascii) => document
            .chars()
            .map(|c| if c.is_ascii() { Ok(c as u8) } else { Err(unencodable(c)) })
            .collect(),
        Some(Charset::Latin1) => document
            .chars()
            .map(|c| u8::try_from(u32::from(c)).map_err(|_| unencodable(c)))
            .collect(),
        None => Err(MessageError::serialization(
            document,
            format!("Failed to serialise in '{encoding}'"),
        )),
    }
}

fn write_documents(roots: &Map, indent: bool) -> Result<String> {
    let names: Vec<&str> = roots
        .keys()
        .map(String::as_str)
        .filter(|k| !is_header(k))
        .collect();
    if names.len() > 1 {
        return Err(MessageError::serialization(
            Value::Map(roots.clone()).to_string(),
            format!("Multiple root elements found [{}]", names.join(", ")),
        ));
    }

    let mut out = String::new();
    let version = roots.get(HEADER_VERSION).filter(|v| !v.is_null());
    let encoding = roots.get(HEADER_ENCODING).filter(|v| !v.is_null());
    for name in names {
        if let Some(version) = version {
            out.push_str(&format!("<?xml version=\"{version}\""));
            if let Some(encoding) = encoding {
                out.push_str(&format!(" encoding=\"{encoding}\""));
            }
            out.push_str("?>");
        }
        if let Some(value) = roots.get(name) {
            write_node(&mut out, name, value, indent.then_some(0))?;
        }
    }
    Ok(out.trim().to_owned())
}

fn write_node(out: &mut String, name: &str, value: &Value, depth: Option<usize>) -> Result<()> {
    match value {
        Value::Map(contents) => write_element(out, name, contents, depth),
        Value::List(siblings) => siblings
            .iter()
            .try_for_each(|sibling| write_node(out, name, sibling, depth)),
        Value::Null => {
            newline(out, depth);
            out.push_str(&format!("<{name}></{name}>"));
            Ok(())
        }
        other => Err(MessageError::serialization(
            name,
            format!("Unexpected structure {other}"),
        )),
    }
}

fn write_element(out: &mut String, name: &str, contents: &Map, depth: Option<usize>) -> Result<()> {
    newline(out, depth);
    out.push('<');
    out.push_str(name);
    for (key, value) in contents {
        if let Some(attribute) = key.strip_prefix('@') {
            out.push_str(&format!(" {attribute}=\"{}\"", escape(&value.to_string(), true)));
        }
    }
    out.push('>');

    if let Some(text) = contents.get(TEXT).filter(|v| !v.is_null()) {
        out.push_str(&escape(&text.to_string(), false));
    }

    let mut has_children = false;
    for (key, value) in contents {
        if !key.starts_with('@') && key != TEXT {
            has_children = true;
            write_node(out, key, value, depth.map(|d| d + 1))?;
        }
    }
    if has_children {
        newline(out, depth);
    }
    out.push_str(&format!("</{name}>"));
    Ok(())
}

fn newline(out: &mut String, depth: Option<usize>) {
    if let Some(depth) = depth {
        out.push('\n');
        out.push_str(&"  ".repeat(depth));
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

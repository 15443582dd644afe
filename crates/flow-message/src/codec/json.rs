//! JSON documents, addressed by dotted tree path.
//!
//! Fields look like `a.b[2].c`. A leading `[i]` addresses into a root list
//! and the empty field addresses the root value itself.

use super::Codec;
use crate::engine::{leaves, traverse, Path, Walk};
use crate::error::{MessageError, Result};
use crate::ledger::Update;
use crate::value::{FieldValue, Map, Value};
use serde::Serialize;
use serde_json::ser::Formatter;
use std::collections::BTreeSet;
use std::io;

pub struct JsonCodec;

impl JsonCodec {
    fn path(field: &str) -> Result<Path> {
        let mut elements: Vec<&str> = field.split('.').collect();
        if !elements[0].is_empty() && !elements[0].starts_with('[') {
            elements.insert(0, "");
        }
        Path::parse(Self::NAME, field, elements)
    }

    fn to_json(repr: &Value) -> Result<serde_json::Value> {
        repr.to_json()
            .ok_or_else(|| MessageError::serialization(repr.to_string(), "bytes have no JSON form"))
    }
}

impl Codec for JsonCodec {
    type Repr = Value;

    const NAME: &'static str = "json";

    fn empty() -> Value {
        Value::Map(Map::new())
    }

    fn parse(bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice::<serde_json::Value>(bytes)
            .map(Value::from)
            .map_err(|e| MessageError::parse(Self::NAME, bytes, e))
    }

    fn validate(field: &str, value: &FieldValue) -> Result<()> {
        Self::path(field)?;
        match value {
            FieldValue::Value(v) if v.contains_bytes() => {
                Err(MessageError::invalid_value(Self::NAME, field, "bytes"))
            }
            _ => Ok(()),
        }
    }

    fn apply(repr: &mut Value, update: &Update) -> Result<()> {
        let path = Self::path(update.field())?;
        let value = match update.value() {
            None => None,
            Some(FieldValue::EmptyMap) => Some(Value::Map(Map::new())),
            Some(FieldValue::EmptyList) => Some(Value::List(Vec::new())),
            Some(FieldValue::Value(v)) => Some(v.clone()),
            Some(FieldValue::Delete | FieldValue::NonFinite(_)) => None,
        };
        // no sense vivifying a path on the way to deleting something absent
        let walk = if value.is_some() { Walk::WRITE } else { Walk::READ };
        let list_value = value.clone();

        let mut root = Map::new();
        root.insert(String::new(), std::mem::take(repr));
        traverse(
            &mut root,
            &path,
            walk,
            |map, key| match value {
                Some(v) => {
                    map.insert(key.to_owned(), v);
                }
                None => {
                    map.remove(key);
                }
            },
            |list, index| match list_value {
                Some(v) => list[index] = v,
                None => {
                    list.remove(index);
                }
            },
        )
        .map_err(|c| c.into_error(update.field()))?;
        *repr = root.remove("").unwrap_or_default();
        Ok(())
    }

    fn access(repr: &Value, field: &str) -> Result<Option<Value>> {
        let path = Self::path(field)?;
        let mut root = Map::new();
        root.insert(String::new(), repr.clone());
        let found = traverse(
            &mut root,
            &path,
            Walk::READ,
            |map, key| map.get(key).cloned(),
            |list, index| list.get(index).cloned(),
        )
        .map_err(|c| c.into_error(field))?;
        Ok(found.flatten())
    }

    fn fields(repr: &Value) -> BTreeSet<String> {
        leaves(repr, ".").into_iter().map(|(path, _)| path).collect()
    }

    fn serialize(repr: &Value) -> Result<Vec<u8>> {
        let json = Self::to_json(repr)?;
        serde_json::to_vec(&json).map_err(|e| MessageError::serialization(json.to_string(), e))
    }

    fn render(repr: &Value) -> Result<String> {
        let json = Self::to_json(repr)?;
        let mut out = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut out, IndentFormatter::default());
        json.serialize(&mut ser)
            .map_err(|e| MessageError::serialization(json.to_string(), e))?;
        String::from_utf8(out).map_err(|e| MessageError::serialization(json.to_string(), e))
    }
}

/// Indents object members two spaces per level, `"key" : value`, and keeps
/// arrays on one line: `[ 1, 2 ]`. Empty containers render as `{ }` and `[ ]`.
#[derive(Default)]
struct IndentFormatter {
    depth: usize,
    has_value: bool,
}

impl IndentFormatter {
    fn newline<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b"\n")?;
        for _ in 0..self.depth {
            writer.write_all(b"  ")?;
        }
        Ok(())
    }
}

impl Formatter for IndentFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b" ]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        writer.write_all(if first { b" " } else { b", " })
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.depth -= 1;
        if self.has_value {
            self.newline(writer)?;
        } else {
            writer.write_all(b" ")?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        self.newline(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b" : ")
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Json;
    use crate::message::Message;
    use crate::value::{DELETE, EMPTY_LIST, EMPTY_MAP};

    #[test]
    fn test_vivify_list() {
        let mut msg = Json::new();
        msg.set("a.b[2]", "x").unwrap();
        assert_eq!(
            msg.get("a.b").unwrap(),
            Some(Value::List(vec![Value::Null, Value::Null, Value::from("x")]))
        );
        assert_eq!(msg.content().unwrap(), br#"{"a":{"b":[null,null,"x"]}}"#.to_vec());
    }

    #[test]
    fn test_human_form() {
        let mut msg = Json::from_bytes(br#"{"b":[1,2],"a":{"c":"x","d":{}},"e":[],"f":[{"g":1}]}"#)
            .unwrap();
        msg.set("h", true).unwrap();
        assert_eq!(
            msg.as_human().unwrap(),
            "{\n  \"a\" : {\n    \"c\" : \"x\",\n    \"d\" : { }\n  },\n  \"b\" : [ 1, 2 ],\n  \"e\" : [ ],\n  \"f\" : [ {\n    \"g\" : 1\n  } ],\n  \"h\" : true\n}"
        );
    }

    #[test]
    fn test_root_addressing() {
        let mut msg = Json::from_bytes(b"[1,2,3]").unwrap();
        msg.set("[1]", DELETE).unwrap();
        assert_eq!(msg.content().unwrap(), b"[1,3]".to_vec());
        assert_eq!(msg.get("[0]").unwrap(), Some(Value::from(1)));

        msg.set("", "replaced").unwrap();
        assert_eq!(msg.content().unwrap(), br#""replaced""#.to_vec());
        assert_eq!(msg.fields().unwrap(), BTreeSet::from([String::new()]));
    }

    #[test]
    fn test_markers_and_deletes() {
        let mut msg = Json::new();
        msg.set("a", EMPTY_MAP)
            .unwrap()
            .set("b", EMPTY_LIST)
            .unwrap()
            .set("c", 1)
            .unwrap()
            .set("c", DELETE)
            .unwrap()
            .set("never.set", DELETE)
            .unwrap();
        assert_eq!(msg.content().unwrap(), br#"{"a":{},"b":[]}"#.to_vec());
        assert!(msg.fields().unwrap().is_empty());
    }

    #[test]
    fn test_bytes_rejected() {
        let mut msg = Json::new();
        assert!(matches!(
            msg.set("a", vec![1u8, 2]).unwrap_err(),
            MessageError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_conflict_is_reported_at_fold() {
        let mut msg = Json::from_bytes(br#"{"a":1}"#).unwrap();
        msg.set("a.b", 2).unwrap();
        assert!(matches!(
            msg.content().unwrap_err(),
            MessageError::PathConflict { .. }
        ));
    }

    #[test]
    fn test_parse_is_deferred() {
        let msg = Json::from_bytes(b"{not json").unwrap();
        assert!(matches!(msg.content().unwrap_err(), MessageError::Parse { .. }));
    }

    #[test]
    fn test_fields_round_trip() {
        let msg = Json::from_bytes(br#"{"a":[{"b":1},null,2],"c":{"d":"e"}}"#).unwrap();
        let fields = msg.fields().unwrap();
        assert_eq!(
            fields.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["a[0].b", "a[2]", "c.d"]
        );
        for field in &fields {
            assert!(msg.get(field).unwrap().is_some(), "{field}");
        }
    }
}

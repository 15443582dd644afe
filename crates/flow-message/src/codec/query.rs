//! SQL queries: the statement text plus numbered bind variables.
//!
//! The wire form is a small JSON object and is not any real database's
//! protocol.

use super::{Codec, Msg};
use crate::error::{MessageError, Result};
use crate::ledger::Update;
use crate::value::{FieldValue, Map, Value};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sqlformat::{FormatOptions, QueryParams};
use std::collections::BTreeSet;

/// Address of the statement text.
pub const SQL: &str = "sql";

const WARNING: &str = "This is not representative of an actual wire protocol";

/// One typed key/value pair on the wire. Byte values travel base64-encoded
/// under `b` so they decode back to bytes rather than text.
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Pair<K> {
    k: K,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    b: Option<String>,
}

impl<K> Pair<K> {
    pub(super) fn new(k: K, value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Bytes(bytes) => Self {
                k,
                v: None,
                b: Some(STANDARD.encode(bytes)),
            },
            other => Self {
                k,
                v: Some(other.to_json().ok_or_else(|| {
                    MessageError::serialization(other.to_string(), "unencodable value")
                })?),
                b: None,
            },
        })
    }

    pub(super) fn into_entry(self) -> std::result::Result<(K, Value), base64::DecodeError> {
        let value = match (self.v, self.b) {
            (_, Some(b)) => Value::Bytes(STANDARD.decode(b)?),
            (Some(v), None) => Value::from(v),
            (None, None) => Value::Null,
        };
        Ok((self.k, value))
    }
}

#[derive(Serialize, Deserialize)]
struct Wire {
    pairs: Vec<Pair<String>>,
    #[serde(default, skip_deserializing)]
    warning: Option<String>,
}

pub struct QueryCodec;

/// Decimal ordinal without leading zeros, so each ordinal has one field name.
fn bind_index(field: &str) -> Option<u64> {
    let canonical = field == "0" || !field.starts_with('0');
    if canonical && !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()) {
        field.parse().ok()
    } else {
        None
    }
}

impl Codec for QueryCodec {
    type Repr = Map;

    const NAME: &'static str = "query";

    fn empty() -> Map {
        Map::new()
    }

    fn parse(bytes: &[u8]) -> Result<Map> {
        let wire: Wire =
            serde_json::from_slice(bytes).map_err(|e| MessageError::parse(Self::NAME, bytes, e))?;
        wire.pairs
            .into_iter()
            .map(Pair::into_entry)
            .collect::<std::result::Result<Map, _>>()
            .map_err(|e| MessageError::parse(Self::NAME, bytes, e))
    }

    fn validate(field: &str, value: &FieldValue) -> Result<()> {
        if field != SQL && bind_index(field).is_none() {
            return Err(MessageError::invalid_field(
                Self::NAME,
                field,
                "expected 'sql' or a bind variable ordinal",
            ));
        }
        if field == SQL {
            if let FieldValue::Value(v) = value {
                if !matches!(v, Value::Text(_) | Value::Null) {
                    return Err(MessageError::invalid_value(Self::NAME, field, v.kind()));
                }
            }
        }
        super::require_scalar(Self::NAME, field, value)
    }

    fn apply(repr: &mut Map, update: &Update) -> Result<()> {
        match update.value().and_then(FieldValue::as_value) {
            Some(value) => {
                repr.insert(update.field().to_owned(), value.clone());
            }
            None => {
                repr.remove(update.field());
            }
        }
        Ok(())
    }

    fn access(repr: &Map, field: &str) -> Result<Option<Value>> {
        Ok(repr.get(field).cloned())
    }

    fn fields(repr: &Map) -> BTreeSet<String> {
        repr.keys().cloned().collect()
    }

    fn serialize(repr: &Map) -> Result<Vec<u8>> {
        let wire = Wire {
            pairs: repr
                .iter()
                .map(|(k, v)| Pair::new(k.clone(), v))
                .collect::<Result<_>>()?,
            warning: Some(WARNING.to_owned()),
        };
        serde_json::to_vec(&wire)
            .map_err(|e| MessageError::serialization(Value::Map(repr.clone()).to_string(), e))
    }

    fn render(repr: &Map) -> Result<String> {
        let sql = repr
            .get(SQL)
            .map_or_else(|| "null".to_owned(), Value::to_string);
        let mut human = format!("Query:\n{}\nBind variables:", format_sql(&sql));
        for (index, value) in binds(repr) {
            human.push_str(&format!("\n {index:>2} : {value}"));
        }
        Ok(human)
    }
}

/// Bind variables in ordinal order. Unset ordinals are skipped.
fn binds(repr: &Map) -> Vec<(u64, &Value)> {
    let mut binds: Vec<(u64, &Value)> = repr
        .iter()
        .filter_map(|(k, v)| bind_index(k).map(|i| (i, v)))
        .collect();
    binds.sort_by_key(|(i, _)| *i);
    binds
}

impl Msg<QueryCodec> {
    /// A query with the given statement text.
    pub fn sql(sql: &str) -> Self {
        let mut repr = Map::new();
        repr.insert(SQL.to_owned(), Value::Text(sql.to_owned()));
        Self::literal(repr)
    }

    /// Sets bind variables `1..=n` from `values`.
    pub fn binds<I, V>(&mut self, values: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        for (index, value) in values.into_iter().enumerate() {
            self.set(&(index + 1).to_string(), value)?;
        }
        Ok(self)
    }

    /// The statement text and its bind variables, ready for execution.
    pub fn bound(&self) -> Result<(Option<String>, Vec<Value>)> {
        let data = self.data()?;
        let sql = data.get(SQL).and_then(Value::as_str).map(str::to_owned);
        let values = binds(&data).into_iter().map(|(_, v)| v.clone()).collect();
        Ok((sql, values))
    }
}

/// Lays SQL out one clause per line with clause contents indented.
fn format_sql(sql: &str) -> String {
    sqlformat::format(sql, &QueryParams::None, FormatOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Query;
    use crate::mask::Mask;
    use crate::message::{Message, Unpredictable};
    use crate::value::DELETE;

    struct Rng;

    impl Unpredictable for Rng {
        fn name(&self) -> String {
            "rng".into()
        }
    }

    const SIMPLE: &str = "SELECT foo FROM bar WHERE baz = ?";

    #[test]
    fn test_binds_render() {
        let mut query = Query::sql("SELECT foo FROM table WHERE a = ? AND b = ? AND c = ?");
        query.binds(["abc", "def", "ghi"]).unwrap();
        assert_eq!(
            query.as_human().unwrap(),
            "Query:\nSELECT\n  foo\nFROM\n  table\nWHERE\n  a = ?\n  AND b = ?\n  AND c = ?\n\
             Bind variables:\n  1 : abc\n  2 : def\n  3 : ghi"
        );
    }

    #[test]
    fn test_joins_and_parentheses() {
        let mut query = Query::sql(
            "SELECT foo, bar FROM table LEFT JOIN lj_table ON ( table.foo = lj_table.foo ) \
             WHERE column_a = ? AND column_b = ?",
        );
        query.set("1", "string_value").unwrap().set("2", 2).unwrap();
        assert_eq!(
            query.as_human().unwrap(),
            "Query:\nSELECT\n  foo,\n  bar\nFROM\n  table\n  LEFT JOIN lj_table ON (table.foo = lj_table.foo)\n\
             WHERE\n  column_a = ?\n  AND column_b = ?\nBind variables:\n  1 : string_value\n  2 : 2"
        );
        assert_eq!(
            query.fields().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["1", "2", "sql"]
        );
    }

    #[test]
    fn test_function_calls_keep_tight_parentheses() {
        assert_eq!(
            format_sql("SELECT count(*) FROM t GROUP BY a ORDER BY b"),
            "SELECT\n  count(*)\nFROM\n  t\nGROUP BY\n  a\nORDER BY\n  b"
        );
    }

    #[test]
    fn test_many_binds_align() {
        let mut query = Query::sql("SELECT 1");
        for i in 0..12 {
            query.set(&i.to_string(), i).unwrap();
        }
        let human = query.as_human().unwrap();
        assert!(human.contains("\n  9 : 9\n 10 : 10\n 11 : 11"), "{human}");
    }

    #[test]
    fn test_delete_bind() {
        let mut query = Query::sql(SIMPLE);
        query.set("1", "value").unwrap().set("1", DELETE).unwrap();
        assert!(query.as_human().unwrap().ends_with("Bind variables:"));
    }

    #[test]
    fn test_bound_skips_gaps() {
        let mut query = Query::sql(SIMPLE);
        for (i, v) in [(1, "abc"), (2, "def"), (3, "ghi"), (4, "jkl"), (6, "mno")] {
            query.set(&i.to_string(), v).unwrap();
        }
        let (sql, values) = query.bound().unwrap();
        assert_eq!(sql.as_deref(), Some(SIMPLE));
        assert_eq!(
            values,
            ["abc", "def", "ghi", "jkl", "mno"].map(Value::from).to_vec()
        );
    }

    #[test]
    fn test_types_survive_wire() {
        let mut query = Query::sql("SELECT 1");
        query
            .set("0", true)
            .unwrap()
            .set("1", 3)
            .unwrap()
            .set("2", 4.5)
            .unwrap()
            .set("3", "bcd")
            .unwrap()
            .set("4", b"bytes".to_vec())
            .unwrap()
            .set("5", Value::Null)
            .unwrap();
        assert!(query
            .as_human()
            .unwrap()
            .ends_with("  0 : true\n  1 : 3\n  2 : 4.5\n  3 : bcd\n  4 : Ynl0ZXM=\n  5 : null"));

        let parsed = query.peer(&query.content().unwrap()).unwrap();
        assert_eq!(parsed.get(SQL).unwrap(), Some(Value::from("SELECT 1")));
        assert_eq!(parsed.get("0").unwrap(), Some(Value::Bool(true)));
        assert_eq!(parsed.get("2").unwrap(), Some(Value::from(4.5)));
        assert_eq!(parsed.get("4").unwrap(), Some(Value::Bytes(b"bytes".to_vec())));
        assert_eq!(parsed.get("5").unwrap(), Some(Value::Null));
        assert_eq!(parsed.as_human().unwrap(), query.as_human().unwrap());
    }

    #[test]
    fn test_peer_inherits_masks() {
        let mut query = Query::sql(SIMPLE);
        query
            .set("1", "random!")
            .unwrap()
            .masking(&Rng, |m: Mask| m.replace("1", "_MASKED_"))
            .unwrap();

        let mut other = Query::sql("SELECT oof FROM rab WHERE zab = ?");
        other.set("1", "!modnar").unwrap();
        let peer = query.peer(&other.content().unwrap()).unwrap();
        assert_eq!(
            peer.assertable(&[&Rng]).unwrap(),
            "Query:\nSELECT\n  oof\nFROM\n  rab\nWHERE\n  zab = ?\nBind variables:\n  1 : _MASKED_"
        );
        assert_eq!(
            query.child().assertable(&[&Rng]).unwrap(),
            query.assertable(&[&Rng]).unwrap()
        );
    }

    #[test]
    fn test_bad_bytes() {
        let peer = Query::new().peer(b"{]").unwrap();
        match peer.as_human().unwrap_err() {
            MessageError::Parse { text, bytes, .. } => {
                assert_eq!(text, "{]");
                assert_eq!(bytes, "[123, 93]");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_invalid_fields_and_values() {
        let mut query = Query::new();
        assert!(matches!(
            query.set("name", "x").unwrap_err(),
            MessageError::InvalidField { .. }
        ));
        assert!(matches!(
            query.set("1", Value::List(vec![])).unwrap_err(),
            MessageError::InvalidValue { .. }
        ));
        assert!(matches!(
            query.set(SQL, 1).unwrap_err(),
            MessageError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_padded_ordinal_rejected() {
        let mut query = Query::sql(SIMPLE);
        query.set("1", "one").unwrap();
        assert!(matches!(
            query.set("01", "zero-one").unwrap_err(),
            MessageError::InvalidField { .. }
        ));
        query.set("0", "zero").unwrap();
        let (_, values) = query.bound().unwrap();
        assert_eq!(values, vec![Value::from("zero"), Value::from("one")]);
    }
}

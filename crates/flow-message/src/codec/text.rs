//! Plain text, addressed by regular expression.

use super::Codec;
use crate::error::{MessageError, Result};
use crate::ledger::Update;
use crate::value::{FieldValue, Value};
use regex::{NoExpand, Regex};
use std::collections::BTreeSet;

pub struct TextCodec;

impl TextCodec {
    fn pattern(field: &str) -> Result<Regex> {
        Regex::new(field).map_err(|e| MessageError::invalid_field(Self::NAME, field, e.to_string()))
    }
}

impl Codec for TextCodec {
    type Repr = String;

    const NAME: &'static str = "text";
    const DEFERRED: bool = false;

    fn empty() -> String {
        String::new()
    }

    fn parse(bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn validate(field: &str, value: &FieldValue) -> Result<()> {
        Self::pattern(field)?;
        super::require_scalar(Self::NAME, field, value)
    }

    fn apply(repr: &mut String, update: &Update) -> Result<()> {
        let pattern = Self::pattern(update.field())?;
        let replacement = match update.value() {
            Some(FieldValue::Value(value)) => value.to_string(),
            _ => String::new(),
        };
        *repr = pattern
            .replace_all(repr.as_str(), NoExpand(replacement.as_str()))
            .into_owned();
        Ok(())
    }

    fn access(repr: &String, field: &str) -> Result<Option<Value>> {
        let pattern = Self::pattern(field)?;
        Ok(pattern.captures(repr).and_then(|caps| {
            let group = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
            group.map(|m| Value::Text(m.as_str().to_owned()))
        }))
    }

    fn fields(_: &String) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn serialize(repr: &String) -> Result<Vec<u8>> {
        Ok(repr.as_bytes().to_vec())
    }

    fn render(repr: &String) -> Result<String> {
        Ok(repr.clone())
    }
}

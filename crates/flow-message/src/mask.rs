//! Masks that redact unpredictable content from human-readable renderings.
//!
//! A [`Mask`] is an ordered list of operations. Field operations run against a
//! throwaway child of the message before it is rendered. Text operations run
//! over the rendered text. Neither ever touches the wire content of the
//! original message.

use crate::error::{MessageError, Result};
use crate::message::{Message, Tag, Unpredictable};
use crate::value::{FieldValue, Value, DELETE};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

type FieldOp = Arc<dyn Fn(&mut dyn Message) -> Result<()> + Send + Sync>;
type TextOp = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone)]
enum Operation {
    Field(FieldOp),
    Text(TextOp),
}

/// Redaction operations registered under one unpredictable source.
#[derive(Clone, Default)]
pub struct Mask {
    operations: Vec<Operation>,
    problems: Vec<String>,
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .operations
            .iter()
            .filter(|op| matches!(op, Operation::Field(_)))
            .count();
        f.debug_struct("Mask")
            .field("field_operations", &fields)
            .field("text_operations", &(self.operations.len() - fields))
            .field("problems", &self.problems)
            .finish()
    }
}

impl Mask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an arbitrary operation on the message being masked.
    pub fn and_then<F>(mut self, op: F) -> Self
    where
        F: Fn(&mut dyn Message) -> Result<()> + Send + Sync + 'static,
    {
        self.operations.push(Operation::Field(Arc::new(op)));
        self
    }

    /// Adds a transformation of the rendered text.
    pub fn text<F>(mut self, op: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.operations.push(Operation::Text(Arc::new(op)));
        self
    }

    /// Replaces every match of `pattern` in the rendered text. `$n` in the
    /// replacement expands to capture groups.
    pub fn text_replace(self, pattern: &str, replacement: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => {
                let replacement = replacement.to_owned();
                self.text(move |text| regex.replace_all(text, replacement.as_str()).into_owned())
            }
            Err(e) => self.invalid(format!("bad pattern '{pattern}': {e}")),
        }
    }

    /// Deletes the named fields.
    pub fn delete<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.and_then(move |msg| {
            for field in &fields {
                msg.set_field(field, DELETE)?;
            }
            Ok(())
        })
    }

    /// Deletes every field except the named ones and their ancestors.
    pub fn retain<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keep: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        self.and_then(move |msg| {
            let mut doomed: Vec<String> = msg
                .fields()?
                .into_iter()
                .filter(|f| !keep.contains(f) && !keep.iter().any(|k| is_ancestor(f, k)))
                .collect();
            // highest list indices first, so earlier deletions don't shift later ones
            doomed.sort_by(|a, b| natural_cmp(b, a));
            for field in &doomed {
                msg.set_field(field, DELETE)?;
            }
            Ok(())
        })
    }

    /// Replaces a present field with the result of `mutation`. Absent or null
    /// fields, and mutations returning `None`, are left alone.
    pub fn field<F>(self, field: &str, mutation: F) -> Self
    where
        F: Fn(Value) -> Option<FieldValue> + Send + Sync + 'static,
    {
        let field = field.to_owned();
        self.and_then(move |msg| {
            if let Some(current) = msg.get(&field)?.filter(|v| !v.is_null()) {
                if let Some(next) = mutation(current) {
                    msg.set_field(&field, next)?;
                }
            }
            Ok(())
        })
    }

    /// Replaces a present field with a fixed value.
    pub fn replace(self, field: &str, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        self.field(field, move |_| Some(value.clone()))
    }

    /// Like [`Mask::field`], over the field's string form.
    pub fn string<F>(self, field: &str, mutation: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.field(field, move |value| {
            mutation(&value.to_string()).map(FieldValue::from)
        })
    }

    /// Overwrites every character of a field with `replacement`, keeping its length.
    pub fn chars(self, field: &str, replacement: &str) -> Self {
        if replacement.is_empty() {
            return self.invalid("Replacement characters are mandatory");
        }
        let replacement = replacement.to_owned();
        self.string(field, move |value| {
            Some(right_pad(String::new(), value.chars().count(), &replacement))
        })
    }

    /// Overwrites a field with `label`, centred and padded with underscores to
    /// the field's original length.
    pub fn label(self, field: &str, label: &str) -> Self {
        let label = label.to_owned();
        self.string(field, move |value| {
            let length = value.chars().count();
            let lpad = (length as i64 - label.chars().count() as i64) / 2;
            let mut masked = right_pad(String::new(), lpad.max(0) as usize, "_");
            masked.push_str(&label);
            Some(right_pad(masked, length, "_"))
        })
    }

    /// Replaces a field with `Matches '<pattern>'` when the whole value matches.
    pub fn matching(self, field: &str, pattern: &str) -> Self {
        match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(regex) => {
                let label = format!("Matches '{pattern}'");
                self.string(field, move |value| {
                    regex.is_match(value).then(|| label.clone())
                })
            }
            Err(e) => self.invalid(format!("bad pattern '{pattern}': {e}")),
        }
    }

    /// Replaces a field with the concatenated capture groups of every match of
    /// `pattern`, or the whole matches if it has no groups.
    pub fn captures(self, field: &str, pattern: &str) -> Self {
        self.captures_with(field, pattern, |caps, out| {
            if caps.len() == 1 {
                out.push_str(caps.get(0).map_or("", |m| m.as_str()));
            } else {
                for group in caps.iter().skip(1).flatten() {
                    out.push_str(group.as_str());
                }
            }
        })
    }

    /// Replaces a field with `replacement`, expanded once per match of `pattern`.
    pub fn captures_replace(self, field: &str, pattern: &str, replacement: &str) -> Self {
        let replacement = replacement.to_owned();
        self.captures_with(field, pattern, move |caps, out| {
            caps.expand(&replacement, out)
        })
    }

    fn captures_with<F>(self, field: &str, pattern: &str, each: F) -> Self
    where
        F: Fn(&regex::Captures<'_>, &mut String) + Send + Sync + 'static,
    {
        match Regex::new(pattern) {
            Ok(regex) => self.string(field, move |value| {
                let mut masked = String::new();
                let mut found = false;
                for caps in regex.captures_iter(value) {
                    each(&caps, &mut masked);
                    found = true;
                }
                found.then(|| masked.trim().to_owned())
            }),
            Err(e) => self.invalid(format!("bad pattern '{pattern}': {e}")),
        }
    }

    fn invalid(mut self, reason: impl Into<String>) -> Self {
        self.problems.push(reason.into());
        self
    }

    pub(crate) fn apply_fields(&self, msg: &mut dyn Message) -> Result<()> {
        for op in &self.operations {
            if let Operation::Field(op) = op {
                op(msg)?;
            }
        }
        Ok(())
    }

    pub(crate) fn apply_text(&self, text: &str) -> String {
        self.operations
            .iter()
            .fold(text.to_owned(), |text, op| match op {
                Operation::Text(op) => op(&text),
                Operation::Field(_) => text,
            })
    }
}

fn right_pad(mut sb: String, length: usize, pad: &str) -> String {
    while sb.chars().count() < length {
        sb.push_str(pad);
    }
    sb.chars().take(length).collect()
}

fn is_ancestor(field: &str, descendant: &str) -> bool {
    descendant.len() > field.len()
        && descendant.starts_with(field)
        && descendant[field.len()..].starts_with(['/', '.', '['])
}

/// Orders digit runs numerically, so that `a[10]` sorts after `a[2]`.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn chunks(s: &str) -> Vec<(bool, &str)> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut digits = None;
        for (i, c) in s.char_indices() {
            let d = c.is_ascii_digit();
            if digits != Some(d) {
                if let Some(was) = digits {
                    out.push((was, &s[start..i]));
                }
                start = i;
                digits = Some(d);
            }
        }
        if let Some(was) = digits {
            out.push((was, &s[start..]));
        }
        out
    }

    let (ca, cb) = (chunks(a), chunks(b));
    for ((da, sa), (db, sb)) in ca.iter().zip(cb.iter()) {
        let ord = if *da && *db {
            let (ta, tb) = (sa.trim_start_matches('0'), sb.trim_start_matches('0'));
            ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb))
        } else {
            sa.cmp(sb)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len())
}

/// Masks keyed by source tag. Copied by value into children and peers.
#[derive(Clone, Default)]
pub struct MaskRegistry(BTreeMap<Tag, Mask>);

impl fmt::Debug for MaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys().map(Tag::name)).finish()
    }
}

impl MaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composes `build` onto the mask already held for `tag`. The registry is
    /// left unchanged if the resulting mask is invalid.
    pub fn register(&mut self, tag: Tag, build: impl FnOnce(Mask) -> Mask) -> Result<()> {
        let mask = build(self.0.get(&tag).cloned().unwrap_or_default());
        if let Some(reason) = mask.problems.first() {
            return Err(MessageError::InvalidMask {
                source_name: tag.name().to_owned(),
                reason: reason.clone(),
            });
        }
        self.0.insert(tag, mask);
        Ok(())
    }

    pub fn get(&self, source: &dyn Unpredictable) -> Option<&Mask> {
        self.0.get(&source.tag())
    }

    /// Masks for the given sources, in the order given.
    pub fn select(&self, sources: &[&dyn Unpredictable]) -> Vec<Mask> {
        sources
            .iter()
            .filter_map(|source| self.get(*source).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

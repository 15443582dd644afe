//! Browser interaction sequences.
//!
//! A sequence is a set of named operations plus a string parameter map that
//! every operation reads and updates in turn. Operations run in alphabetical
//! order of name. Fields address the parameter map.

use crate::error::{MessageError, Result};
use crate::ledger::{Lineage, Update};
use crate::mask::{Mask, MaskRegistry};
use crate::message::{Message, Unpredictable};
use crate::value::{FieldValue, Value};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

const NAME: &str = "web";

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new("\r\n|[\n\u{000B}\u{000C}\r\u{0085}\u{2028}\u{2029}]").expect("valid regex")
});

type Params = BTreeMap<String, String>;

/// A browser interaction. Receives the driver and the shared parameter map.
pub type Operation<D> = Arc<dyn Fn(&mut D, &mut Params) -> anyhow::Result<()> + Send + Sync>;

/// What a sequence needs from a browser driver to report a failed operation.
pub trait Browser {
    fn current_url(&self) -> anyhow::Result<String>;
    fn page_source(&self) -> anyhow::Result<String>;
}

/// Operations registered on one sequence, layered over those of its parent.
/// A `None` entry hides an inherited operation of the same name.
struct Operations<D> {
    own: Arc<RwLock<BTreeMap<String, Option<Operation<D>>>>>,
    parent: Option<Box<Operations<D>>>,
}

impl<D> Clone for Operations<D> {
    fn clone(&self) -> Self {
        Self {
            own: Arc::clone(&self.own),
            parent: self.parent.clone(),
        }
    }
}

impl<D> Operations<D> {
    fn root() -> Self {
        Self {
            own: Arc::default(),
            parent: None,
        }
    }

    fn layered(&self) -> Self {
        Self {
            own: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    fn snapshot(&self) -> Self {
        Self {
            own: Arc::new(RwLock::new(self.own.read().clone())),
            parent: self.parent.clone(),
        }
    }

    fn collect(&self, into: &mut BTreeMap<String, Option<Operation<D>>>) {
        if let Some(parent) = &self.parent {
            parent.collect(into);
        }
        for (name, op) in self.own.read().iter() {
            into.insert(name.clone(), op.clone());
        }
    }

    fn effective(&self) -> BTreeMap<String, Operation<D>> {
        let mut all = BTreeMap::new();
        self.collect(&mut all);
        all.into_iter()
            .filter_map(|(name, op)| op.map(|op| (name, op)))
            .collect()
    }
}

/// A series of browser interactions over a shared parameter map.
pub struct WebSequence<D> {
    params: Lineage<Params>,
    operations: Operations<D>,
    masks: MaskRegistry,
}

impl<D> fmt::Debug for WebSequence<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSequence")
            .field("params", &self.params)
            .field("operations", &self.operations.effective().keys())
            .field("masks", &self.masks)
            .finish()
    }
}

impl<D: 'static> Default for WebSequence<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: 'static> WebSequence<D> {
    pub fn new() -> Self {
        Self {
            params: Lineage::literal(Params::new()),
            operations: Operations::root(),
            masks: MaskRegistry::new(),
        }
    }

    /// Adds or replaces the named operation.
    pub fn operation<F>(&mut self, name: &str, op: F) -> &mut Self
    where
        F: Fn(&mut D, &mut Params) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.operations
            .own
            .write()
            .insert(name.to_owned(), Some(Arc::new(op)));
        self
    }

    /// Suppresses the named operation, including one inherited from a parent.
    pub fn remove_operation(&mut self, name: &str) -> &mut Self {
        self.operations.own.write().insert(name.to_owned(), None);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        self.set_field(field, value.into())?;
        Ok(self)
    }

    pub fn masking<U>(&mut self, source: &U, build: impl FnOnce(Mask) -> Mask) -> Result<&mut Self>
    where
        U: Unpredictable + ?Sized,
    {
        self.masks.register(source.tag(), build)?;
        Ok(self)
    }

    /// A sequence that sees this one's parameters and operations live, and
    /// layers its own on top.
    pub fn child(&self) -> Self {
        Self {
            params: self.params.descend(),
            operations: self.operations.layered(),
            masks: self.masks.clone(),
        }
    }

    /// A sequence with this one's operations and masks and the parameters
    /// encoded in `content`, typically the output of [`WebSequence::process`].
    pub fn peer(&self, content: &[u8]) -> Result<Self> {
        let parsed: BTreeMap<String, serde_json::Value> =
            serde_json::from_slice(content).map_err(|e| MessageError::parse(NAME, content, e))?;
        let params = parsed
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        Ok(Self {
            params: Lineage::literal(params),
            operations: self.operations.snapshot(),
            masks: self.masks.clone(),
        })
    }

    /// Runs the operations against `driver` and returns the resulting
    /// parameter map in wire form.
    pub fn process(&self, driver: &mut D) -> Result<Vec<u8>>
    where
        D: Browser,
    {
        let mut params = self.parameters()?;
        for (name, op) in self.operations.effective() {
            debug!(operation = %name, "Running browser operation");
            if let Err(e) = op(driver, &mut params) {
                let (url, page) = match driver.current_url() {
                    Ok(url) => {
                        let page = driver.page_source().unwrap_or_else(|f| f.to_string());
                        (url, page)
                    }
                    Err(f) => ("No URL".to_owned(), f.to_string()),
                };
                return Err(MessageError::Operation {
                    name,
                    url,
                    page,
                    reason: e.to_string(),
                });
            }
        }
        encode(&params)
    }

    fn parameters(&self) -> Result<Params> {
        self.params.fold(&parse_params, &apply_param)
    }
}

fn parse_params(bytes: &[u8]) -> Result<Params> {
    serde_json::from_slice(bytes).map_err(|e| MessageError::parse(NAME, bytes, e))
}

fn apply_param(params: &mut Params, update: &Update) -> Result<()> {
    match update.value().and_then(FieldValue::as_value) {
        Some(value) => {
            params.insert(update.field().to_owned(), value.to_string());
        }
        None => {
            params.remove(update.field());
        }
    }
    Ok(())
}

fn encode(params: &Params) -> Result<Vec<u8>> {
    serde_json::to_vec(params).map_err(|e| MessageError::serialization(format!("{params:?}"), e))
}

impl<D: 'static> Message for WebSequence<D> {
    fn codec(&self) -> &'static str {
        NAME
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<()> {
        super::require_scalar(NAME, field, &value)?;
        self.params.record(Update::new(field, value));
        Ok(())
    }

    fn get(&self, field: &str) -> Result<Option<Value>> {
        Ok(self.parameters()?.remove(field).map(Value::Text))
    }

    fn content(&self) -> Result<Vec<u8>> {
        encode(&self.parameters()?)
    }

    fn fields(&self) -> Result<BTreeSet<String>> {
        Ok(self.parameters()?.into_keys().collect())
    }

    fn as_human(&self) -> Result<String> {
        let operations: Vec<String> = self.operations.effective().into_keys().collect();
        Ok(render(&operations, &self.parameters()?))
    }

    fn masks(&self) -> &MaskRegistry {
        &self.masks
    }

    fn masks_mut(&mut self) -> &mut MaskRegistry {
        &mut self.masks
    }

    fn child_message(&self) -> Box<dyn Message> {
        Box::new(self.child())
    }

    fn peer_message(&self, content: &[u8]) -> Result<Box<dyn Message>> {
        Ok(Box::new(self.peer(content)?))
    }
}

fn lines(value: &str) -> Vec<String> {
    let mut lines: Vec<String> = LINE_BREAK
        .split(value)
        .map(|line| line.replace('\t', "    "))
        .collect();
    while lines.len() > 1 && lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

fn width<'a>(items: impl Iterator<Item = &'a str>, heading: &str) -> usize {
    items
        .map(|s| s.chars().count())
        .chain(std::iter::once(heading.chars().count()))
        .max()
        .unwrap_or(0)
}

fn boxed(border: &str, header: &str, content: &str, blank: &str) -> String {
    let content = if content.is_empty() { blank } else { content };
    format!("┌{border}┐\n{header}\n├{border}┤\n{content}\n└{border}┘")
}

fn render(operations: &[String], params: &Params) -> String {
    let split: Vec<(&str, Vec<String>)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), lines(v)))
        .collect();

    let op_width = width(operations.iter().map(String::as_str), "Operations");
    let name_width = width(params.keys().map(String::as_str), "Parameters");
    let value_width = width(
        split.iter().flat_map(|(_, l)| l.iter().map(String::as_str)),
        "Values",
    );

    let op_row = |name: &str| format!("│ {name:<op_width$} │");
    let param_row =
        |name: &str, value: &str| format!("│ {name:<name_width$} │ {value:<value_width$} │");

    let op_rows: Vec<String> = operations.iter().map(|o| op_row(o)).collect();
    let param_rows: Vec<String> = split
        .iter()
        .flat_map(|(key, lines)| {
            lines
                .iter()
                .enumerate()
                .map(|(i, line)| param_row(if i == 0 { *key } else { "" }, line))
                .collect::<Vec<_>>()
        })
        .collect();

    let operations_box = boxed(
        &"─".repeat(op_width + 2),
        &op_row("Operations"),
        &op_rows.join("\n"),
        &op_row(""),
    );
    let parameters_box = boxed(
        &"─".repeat(name_width + value_width + 5),
        &param_row("Parameters", "Values"),
        &param_rows.join("\n"),
        &param_row("", ""),
    );
    format!("{operations_box}\n{parameters_box}")
}

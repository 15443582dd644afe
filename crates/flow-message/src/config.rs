//! YAML mask configuration.
//!
//! ```yaml
//! masks:
//!   timestamp:
//!     - rule: replace
//!       field: header.sent
//!       value: "<sent>"
//!     - rule: delete
//!       fields: [trace.id, trace.span]
//!   rng:
//!     - rule: text
//!       pattern: "[0-9a-f]{32}"
//!       replacement: "<nonce>"
//! ```
//!
//! Each key names an unpredictable source. [`MaskConfig::install`] registers
//! the rules under a [`ConfiguredSource`] of that name.

use crate::error::Result;
use crate::mask::Mask;
use crate::message::{Message, Unpredictable};
use crate::value::{FieldValue, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MaskConfig {
    #[serde(default)]
    pub masks: BTreeMap<String, Vec<MaskRule>>,
}

/// One redaction step. Rules for a source run in the order written.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum MaskRule {
    /// Deletes the named fields. `fields` may be a single string.
    Delete {
        #[serde(deserialize_with = "one_or_many")]
        fields: Vec<String>,
    },
    /// Deletes everything except the named fields.
    Retain {
        #[serde(deserialize_with = "one_or_many")]
        fields: Vec<String>,
    },
    Replace {
        field: String,
        value: serde_json::Value,
    },
    Chars {
        field: String,
        replacement: String,
    },
    Label {
        field: String,
        label: String,
    },
    Match {
        field: String,
        pattern: String,
    },
    /// Keeps only the captured parts of a field, or expands `replacement`
    /// once per match when given.
    Captures {
        field: String,
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        replacement: Option<String>,
    },
    /// Regex replacement over the rendered text.
    Text {
        pattern: String,
        replacement: String,
    },
}

/// Custom deserializer for field lists that accepts a single string or a sequence
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct FieldsVisitor;

    impl<'de> Visitor<'de> for FieldsVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a field name or list of field names")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(vec![v.to_owned()])
        }

        fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut fields = Vec::new();
            while let Some(field) = seq.next_element()? {
                fields.push(field);
            }
            Ok(fields)
        }
    }

    deserializer.deserialize_any(FieldsVisitor)
}

impl MaskRule {
    /// Appends this rule's operation to `mask`.
    pub fn apply(&self, mask: Mask) -> Mask {
        match self {
            MaskRule::Delete { fields } => mask.delete(fields.iter().cloned()),
            MaskRule::Retain { fields } => mask.retain(fields.iter().cloned()),
            MaskRule::Replace { field, value } => {
                mask.replace(field, FieldValue::from(Value::from(value.clone())))
            }
            MaskRule::Chars { field, replacement } => mask.chars(field, replacement),
            MaskRule::Label { field, label } => mask.label(field, label),
            MaskRule::Match { field, pattern } => mask.matching(field, pattern),
            MaskRule::Captures {
                field,
                pattern,
                replacement: None,
            } => mask.captures(field, pattern),
            MaskRule::Captures {
                field,
                pattern,
                replacement: Some(replacement),
            } => mask.captures_replace(field, pattern, replacement),
            MaskRule::Text {
                pattern,
                replacement,
            } => mask.text_replace(pattern, replacement),
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        let (field, pattern) = match self {
            MaskRule::Delete { fields } | MaskRule::Retain { fields } => {
                if fields.is_empty() {
                    return Err("'fields' must name at least one field".to_owned());
                }
                return Ok(());
            }
            MaskRule::Chars { field, replacement } => {
                if replacement.is_empty() {
                    return Err("'replacement' must not be empty".to_owned());
                }
                (Some(field), None)
            }
            MaskRule::Replace { field, .. } | MaskRule::Label { field, .. } => (Some(field), None),
            MaskRule::Match { field, pattern } | MaskRule::Captures { field, pattern, .. } => {
                (Some(field), Some(pattern))
            }
            MaskRule::Text { pattern, .. } => (None, Some(pattern)),
        };
        if field.is_some_and(|f| f.is_empty()) {
            return Err("'field' must not be empty".to_owned());
        }
        if let Some(pattern) = pattern {
            Regex::new(pattern).map_err(|e| format!("bad pattern '{pattern}': {e}"))?;
        }
        Ok(())
    }
}

impl MaskConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: MaskConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every rule
    pub fn validate(&self) -> anyhow::Result<()> {
        for (source, rules) in &self.masks {
            if source.is_empty() {
                anyhow::bail!("Mask source names must not be empty");
            }
            for (i, rule) in rules.iter().enumerate() {
                if let Err(reason) = rule.check() {
                    anyhow::bail!("Invalid rule {} for source '{source}': {reason}", i + 1);
                }
            }
        }
        Ok(())
    }

    /// Sources named by this configuration.
    pub fn sources(&self) -> Vec<ConfiguredSource> {
        self.masks.keys().cloned().map(ConfiguredSource).collect()
    }

    /// Registers each source's rules on `msg`, composing with any masks it
    /// already holds for the same source.
    pub fn install(&self, msg: &mut dyn Message) -> Result<()> {
        for (source, rules) in &self.masks {
            debug!(source = %source, rules = rules.len(), "Installing configured mask");
            msg.masking(&ConfiguredSource(source.clone()), |mask| {
                rules.iter().fold(mask, |mask, rule| rule.apply(mask))
            })?;
        }
        Ok(())
    }
}

/// An unpredictable source identified only by name, as found in configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfiguredSource(pub String);

impl Unpredictable for ConfiguredSource {
    fn name(&self) -> String {
        self.0.clone()
    }
}

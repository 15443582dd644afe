//! Error taxonomy shared by every codec.

use thiserror::Error;

/// Errors raised while building, folding or rendering a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Malformed address syntax for the codec's addressing engine.
    #[error("Invalid {codec} field '{field}': {reason}")]
    InvalidField {
        codec: &'static str,
        field: String,
        reason: String,
    },

    /// A value kind the codec cannot hold at that field.
    #[error("Field '{field}' of {codec} message cannot hold a {kind} value")]
    InvalidValue {
        codec: &'static str,
        field: String,
        kind: &'static str,
    },

    /// The folded structure cannot be written to the wire or human form.
    #[error("Failed to serialise {structure}: {reason}")]
    Serialization { structure: String, reason: String },

    /// Input bytes could not be parsed.
    #[error("Failed to parse {codec} content '{text}' ({bytes}): {reason}")]
    Parse {
        codec: &'static str,
        text: String,
        bytes: String,
        reason: String,
    },

    /// A tree-path write met a value where a container was expected.
    #[error("Field '{field}' crosses a {found} value at '{segment}'")]
    PathConflict {
        field: String,
        segment: String,
        found: &'static str,
    },

    /// A mask builder was given unusable arguments.
    #[error("Invalid mask for '{source_name}': {reason}")]
    InvalidMask { source_name: String, reason: String },

    /// A browser operation failed while processing a web sequence.
    #[error("Operation '{name}' failed on page '{url}': {reason}\n{page}")]
    Operation {
        name: String,
        url: String,
        page: String,
        reason: String,
    },
}

impl MessageError {
    pub fn invalid_field(
        codec: &'static str,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        MessageError::InvalidField {
            codec,
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(codec: &'static str, field: impl Into<String>, kind: &'static str) -> Self {
        MessageError::InvalidValue {
            codec,
            field: field.into(),
            kind,
        }
    }

    pub fn serialization(structure: impl Into<String>, reason: impl ToString) -> Self {
        MessageError::Serialization {
            structure: structure.into(),
            reason: reason.to_string(),
        }
    }

    /// Parse failure carrying both the lossy text and the raw byte values of the input.
    pub fn parse(codec: &'static str, input: &[u8], reason: impl ToString) -> Self {
        MessageError::Parse {
            codec,
            text: String::from_utf8_lossy(input).into_owned(),
            bytes: format!("{input:?}"),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MessageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_carries_text_and_bytes() {
        let err = MessageError::parse("json", b"{x", "expected value");
        assert_eq!(
            err.to_string(),
            "Failed to parse json content '{x' ([123, 120]): expected value"
        );
    }

    #[test]
    fn test_invalid_field_message() {
        let err = MessageError::invalid_field("bytes", "4..2", "indices out of order");
        assert_eq!(
            err.to_string(),
            "Invalid bytes field '4..2': indices out of order"
        );
    }
}

//! Raw byte arrays, addressed by byte range.

use super::Codec;
use crate::engine::ByteRange;
use crate::error::{MessageError, Result};
use crate::ledger::Update;
use crate::value::{FieldValue, Value};
use std::collections::BTreeSet;
use std::fmt::Write as _;

pub struct BytesCodec;

impl BytesCodec {
    fn content(field: &str, value: &FieldValue) -> Result<Vec<u8>> {
        match value {
            FieldValue::Delete => Ok(Vec::new()),
            FieldValue::Value(Value::Bytes(b)) => Ok(b.clone()),
            FieldValue::Value(Value::Number(n)) => match n.as_i64() {
                Some(b @ -128..=255) => Ok(vec![b as u8]),
                _ => Err(MessageError::invalid_value(Self::NAME, field, "out-of-range number")),
            },
            other => Err(MessageError::invalid_value(Self::NAME, field, other.kind())),
        }
    }
}

impl Codec for BytesCodec {
    type Repr = Vec<u8>;

    const NAME: &'static str = "bytes";
    const DEFERRED: bool = false;

    fn empty() -> Vec<u8> {
        Vec::new()
    }

    fn parse(bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn validate(field: &str, value: &FieldValue) -> Result<()> {
        ByteRange::parse(Self::NAME, field)?;
        Self::content(field, value).map(|_| ())
    }

    fn apply(repr: &mut Vec<u8>, update: &Update) -> Result<()> {
        let range = ByteRange::parse(Self::NAME, update.field())?;
        let content = match update.value() {
            Some(value) => Self::content(update.field(), value)?,
            None => Vec::new(),
        };
        *repr = range.replace(&content, repr);
        Ok(())
    }

    fn access(repr: &Vec<u8>, field: &str) -> Result<Option<Value>> {
        let range = ByteRange::parse(Self::NAME, field)?;
        Ok(Some(Value::Bytes(range.infix(repr).to_vec())))
    }

    fn fields(_: &Vec<u8>) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn serialize(repr: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(repr.clone())
    }

    fn render(repr: &Vec<u8>) -> Result<String> {
        let mut out = String::new();
        for &b in repr {
            let _ = writeln!(out, "0b{b:08b}  0d{b:03}  0x{b:02X}  {}", char_name(b));
        }
        Ok(out)
    }
}

const CONTROL_NAMES: [&str; 32] = [
    "NULL",
    "START OF HEADING",
    "START OF TEXT",
    "END OF TEXT",
    "END OF TRANSMISSION",
    "ENQUIRY",
    "ACKNOWLEDGE",
    "BELL",
    "BACKSPACE",
    "CHARACTER TABULATION",
    "LINE FEED (LF)",
    "LINE TABULATION",
    "FORM FEED (FF)",
    "CARRIAGE RETURN (CR)",
    "SHIFT OUT",
    "SHIFT IN",
    "DATA LINK ESCAPE",
    "DEVICE CONTROL ONE",
    "DEVICE CONTROL TWO",
    "DEVICE CONTROL THREE",
    "DEVICE CONTROL FOUR",
    "NEGATIVE ACKNOWLEDGE",
    "SYNCHRONOUS IDLE",
    "END OF TRANSMISSION BLOCK",
    "CANCEL",
    "END OF MEDIUM",
    "SUBSTITUTE",
    "ESCAPE",
    "INFORMATION SEPARATOR FOUR",
    "INFORMATION SEPARATOR THREE",
    "INFORMATION SEPARATOR TWO",
    "INFORMATION SEPARATOR ONE",
];

const DIGIT_NAMES: [&str; 10] = [
    "ZERO", "ONE", "TWO", "THREE", "FOUR", "FIVE", "SIX", "SEVEN", "EIGHT", "NINE",
];

/// Unicode name of an ASCII code point. Bytes with the high bit set have none.
fn char_name(b: u8) -> String {
    let name = match b {
        0..=31 => CONTROL_NAMES[b as usize],
        b'0'..=b'9' => return format!("DIGIT {}", DIGIT_NAMES[(b - b'0') as usize]),
        b'A'..=b'Z' => return format!("LATIN CAPITAL LETTER {}", b as char),
        b'a'..=b'z' => {
            return format!("LATIN SMALL LETTER {}", b.to_ascii_uppercase() as char)
        }
        b' ' => "SPACE",
        b'!' => "EXCLAMATION MARK",
        b'"' => "QUOTATION MARK",
        b'#' => "NUMBER SIGN",
        b'$' => "DOLLAR SIGN",
        b'%' => "PERCENT SIGN",
        b'&' => "AMPERSAND",
        b'\'' => "APOSTROPHE",
        b'(' => "LEFT PARENTHESIS",
        b')' => "RIGHT PARENTHESIS",
        b'*' => "ASTERISK",
        b'+' => "PLUS SIGN",
        b',' => "COMMA",
        b'-' => "HYPHEN-MINUS",
        b'.' => "FULL STOP",
        b'/' => "SOLIDUS",
        b':' => "COLON",
        b';' => "SEMICOLON",
        b'<' => "LESS-THAN SIGN",
        b'=' => "EQUALS SIGN",
        b'>' => "GREATER-THAN SIGN",
        b'?' => "QUESTION MARK",
        b'@' => "COMMERCIAL AT",
        b'[' => "LEFT SQUARE BRACKET",
        b'\\' => "REVERSE SOLIDUS",
        b']' => "RIGHT SQUARE BRACKET",
        b'^' => "CIRCUMFLEX ACCENT",
        b'_' => "LOW LINE",
        b'`' => "GRAVE ACCENT",
        b'{' => "LEFT CURLY BRACKET",
        b'|' => "VERTICAL LINE",
        b'}' => "RIGHT CURLY BRACKET",
        b'~' => "TILDE",
        127 => "DELETE",
        _ => "",
    };
    name.to_owned()
}

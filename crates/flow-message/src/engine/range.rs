//! Byte-range addressing: `i` or `a..b`, either bound optional.

use crate::error::{MessageError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static INDEX_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)$").expect("valid regex"));
static RANGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d*)\.\.(\d*)$").expect("valid regex"));

/// A half-open byte range. Reads clamp to the array; writes splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: usize,
    /// `None` means "to the end of the array".
    end: Option<usize>,
}

impl ByteRange {
    pub fn parse(codec: &'static str, field: &str) -> Result<Self> {
        let bad = |reason: String| MessageError::invalid_field(codec, field, reason);
        let number = |digits: &str| {
            digits
                .parse::<usize>()
                .map_err(|_| bad(format!("'{field}' is not a valid range")))
        };

        let range = if let Some(caps) = INDEX_PATTERN.captures(field) {
            let start = number(&caps[1])?;
            Self {
                start,
                end: Some(start.saturating_add(1)),
            }
        } else if let Some(caps) = RANGE_PATTERN.captures(field) {
            let start = match &caps[1] {
                "" => 0,
                digits => number(digits)?,
            };
            let end = match &caps[2] {
                "" => None,
                digits => Some(number(digits)?),
            };
            Self { start, end }
        } else {
            return Err(bad(format!("'{field}' is not a valid range")));
        };

        if range.end.is_some_and(|end| range.start > end) {
            return Err(bad(
                "range indices must be in 'a..b' order, where a<=b".to_string(),
            ));
        }
        Ok(range)
    }

    fn bounds(&self, len: usize) -> (usize, usize) {
        let start = self.start.min(len);
        let end = self.end.map_or(len, |e| e.min(len));
        (start, end)
    }

    /// Bytes before the range.
    pub fn prefix<'a>(&self, array: &'a [u8]) -> &'a [u8] {
        &array[..self.bounds(array.len()).0]
    }

    /// Bytes inside the range.
    pub fn infix<'a>(&self, array: &'a [u8]) -> &'a [u8] {
        let (start, end) = self.bounds(array.len());
        &array[start..end]
    }

    /// Bytes after the range.
    pub fn suffix<'a>(&self, array: &'a [u8]) -> &'a [u8] {
        &array[self.bounds(array.len()).1..]
    }

    /// `prefix + content + suffix`: set, insert and delete in one operation.
    pub fn replace(&self, content: &[u8], array: &[u8]) -> Vec<u8> {
        let prefix = self.prefix(array);
        let suffix = self.suffix(array);
        let mut combined = Vec::with_capacity(prefix.len() + content.len() + suffix.len());
        combined.extend_from_slice(prefix);
        combined.extend_from_slice(content);
        combined.extend_from_slice(suffix);
        combined
    }
}

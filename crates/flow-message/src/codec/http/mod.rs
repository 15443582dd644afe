//! HTTP/1.x requests and responses wrapping a body message.
//!
//! The head (start line and headers) is held as a flat field map with its own
//! update ledger. The body is any other [`Message`]; fields the head does not
//! own are delegated to it. Headers are addressed as `^Name^`.

mod request;
mod response;

pub use self::request::{path_var, Request, HTTP_METHOD, HTTP_PATH};
pub use self::response::{Response, HTTP_STATUS, HTTP_STATUS_TEXT};

use super::{Bytes, Text};
use crate::error::{MessageError, Result};
use crate::ledger::{Lineage, Update};
use crate::mask::{Mask, MaskRegistry};
use crate::message::{Message, Unpredictable};
use crate::value::{FieldValue, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, warn};

pub const HTTP_VERSION: &str = "HTTP_VERSION";
pub const HTTP_BODY: &str = "HTTP_BODY";

const HEADER_AFFIX: char = '^';

static HEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^([^:]*?):(.*)$").expect("valid regex"));

static CHUNK_LENGTH: Lazy<regex::bytes::Regex> =
    Lazy::new(|| regex::bytes::Regex::new(r"\r\n([0-9a-fA-F]+)\r\n").expect("valid regex"));

/// Head fields, keyed by field name.
pub type Head = BTreeMap<String, Value>;

pub type HttpReq = HttpMessage<Request>;
pub type HttpRes = HttpMessage<Response>;

/// The field name for header `name`.
pub fn header(name: &str) -> String {
    format!("{HEADER_AFFIX}{name}{HEADER_AFFIX}")
}

/// The header name addressed by `field`, if it is a header field.
pub fn unheader(field: &str) -> Option<&str> {
    field
        .strip_prefix(HEADER_AFFIX)
        .and_then(|f| f.strip_suffix(HEADER_AFFIX))
}

fn is_header_field(field: &str) -> bool {
    unheader(field).is_some()
}

/// What differs between requests and responses.
pub trait HttpKind: Send + Sync + 'static {
    const NAME: &'static str;

    /// Fields named by the start line, in wire order.
    const START: [&'static str; 3];

    /// Whether `field` lives in the head rather than the body.
    fn owns(field: &str) -> bool {
        field == HTTP_BODY || Self::START.iter().any(|f| *f == field) || is_header_field(field)
    }

    fn start_line(head: &Head) -> String;

    /// Head fields beyond the fixed ones and headers.
    fn extra_fields(_head: &Head) -> Vec<String> {
        Vec::new()
    }

    /// Adjusts a freshly parsed peer using the head of the message it was peered from.
    fn adopt(_peer: &mut HttpMessage<Self>, _template: &Head) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Text form of a head field, empty when absent.
fn text(head: &Head, field: &str) -> String {
    head.get(field).map(Value::to_string).unwrap_or_default()
}

fn is_chunked(head: &Head) -> bool {
    head.get(&header("Transfer-Encoding")).and_then(Value::as_str) == Some("chunked")
}

fn enchunk(content: &[u8]) -> Vec<u8> {
    let mut out = format!("{:x}\r\n", content.len()).into_bytes();
    out.extend_from_slice(content);
    out.extend_from_slice(b"\r\n0\r\n\r\n");
    out
}

fn dechunk(chunked: &[u8]) -> Vec<u8> {
    let mut input = b"\r\n".to_vec();
    input.extend_from_slice(chunked);
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(caps) = CHUNK_LENGTH.captures_at(&input, from) {
        let length = std::str::from_utf8(&caps[1])
            .ok()
            .and_then(|hex| usize::from_str_radix(hex, 16).ok())
            .unwrap_or(0);
        let start = caps.get(0).map_or(input.len(), |m| m.end());
        let end = start.saturating_add(length).min(input.len());
        out.extend_from_slice(&input[start..end]);
        if length == 0 {
            break;
        }
        from = end;
    }
    out
}

/// Splits wire content at the blank line that ends the head.
fn split_head(content: &[u8]) -> (&[u8], &[u8]) {
    match content.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(i) => (&content[..i], &content[i + 4..]),
        None => (content, &content[content.len()..]),
    }
}

fn apply_head(head: &mut Head, update: &Update) -> Result<()> {
    match update.value().and_then(FieldValue::as_value) {
        Some(value) => {
            head.insert(update.field().to_owned(), value.clone());
        }
        None => {
            head.remove(update.field());
        }
    }
    Ok(())
}

fn parse_head(_: &[u8]) -> Result<Head> {
    Ok(Head::new())
}

/// An HTTP message of kind `K` wrapping an optional body.
pub struct HttpMessage<K> {
    head: Lineage<Head>,
    body: Option<Box<dyn Message>>,
    masks: MaskRegistry,
    kind: PhantomData<K>,
}

impl<K: HttpKind> fmt::Debug for HttpMessage<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMessage")
            .field("kind", &K::NAME)
            .field("head", &self.head)
            .field("body", &self.body)
            .field("masks", &self.masks)
            .finish()
    }
}

impl<K: HttpKind> Default for HttpMessage<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: HttpKind> HttpMessage<K> {
    /// An empty message with no body.
    pub fn new() -> Self {
        Self::with_head(Head::new(), None)
    }

    fn with_head(head: Head, body: Option<Box<dyn Message>>) -> Self {
        Self {
            head: Lineage::literal(head),
            body,
            masks: MaskRegistry::new(),
            kind: PhantomData,
        }
    }

    /// Parses wire content. The body bytes, after removing any chunked
    /// transfer encoding, are handed to `body_parser`.
    pub fn from_bytes<F>(content: &[u8], body_parser: F) -> Result<Self>
    where
        F: FnOnce(&[u8]) -> Result<Option<Box<dyn Message>>>,
    {
        let (head_bytes, body_bytes) = split_head(content);
        let head_text = String::from_utf8_lossy(head_bytes);
        let mut lines = head_text.split("\r\n");

        let mut head = Head::new();
        if let Some(start) = lines.next() {
            let mut parts: Vec<&str> = start.split(' ').collect();
            while parts.last().is_some_and(|p| p.is_empty()) {
                parts.pop();
            }
            let mut parts = parts.into_iter();
            for field in &K::START[..2] {
                if let Some(part) = parts.next() {
                    head.insert((*field).to_owned(), Value::from(part));
                }
            }
            let rest: Vec<&str> = parts.collect();
            if !rest.is_empty() {
                head.insert(K::START[2].to_owned(), Value::from(rest.join(" ")));
            }
        }
        for line in lines {
            if let Some(caps) = HEADER_LINE.captures(line) {
                head.insert(header(caps[1].trim()), Value::from(caps[2].trim()));
            }
        }

        let body = if is_chunked(&head) {
            dechunk(body_bytes)
        } else {
            body_bytes.to_vec()
        };
        debug!(codec = K::NAME, head = head.len(), body = body.len(), "Parsed HTTP message");
        Ok(Self::with_head(head, body_parser(&body)?))
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        self.set_field(field, value.into())?;
        Ok(self)
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Result<Self> {
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

    /// Replaces the body.
    pub fn set_body<M: Message + 'static>(&mut self, body: M) -> &mut Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn with_body<M: Message + 'static>(mut self, body: M) -> Self {
        self.set_body(body);
        self
    }

    pub fn body(&self) -> Option<&dyn Message> {
        self.body.as_deref()
    }

    pub fn body_mut(&mut self) -> Option<&mut (dyn Message + 'static)> {
        self.body.as_deref_mut()
    }

    /// The body's human-readable form, empty without a body.
    pub fn body_text(&self) -> Result<String> {
        self.body.as_ref().map_or(Ok(String::new()), |b| b.as_human())
    }

    /// Header values by header name.
    pub fn headers(&self) -> Result<BTreeMap<String, String>> {
        Ok(headers(&self.head()?))
    }

    pub fn version(&self) -> Result<String> {
        Ok(text(&self.head()?, HTTP_VERSION))
    }

    /// A message whose head is this message's live head and whose body is a
    /// child of this message's body.
    pub fn child(&self) -> Self {
        Self {
            head: self.head.descend(),
            body: self.body.as_ref().map(|b| b.child_message()),
            masks: self.masks.clone(),
            kind: PhantomData,
        }
    }

    /// Parses `content`, handing the body bytes to this message's body so
    /// that the peer's body has the same codec. Without a body, any body
    /// content is held as text.
    pub fn peer(&self, content: &[u8]) -> Result<Self> {
        let mut peer = Self::from_bytes(content, |bytes| match &self.body {
            Some(template) => template.peer_message(bytes).map(Some).map_err(|e| {
                MessageError::parse(template.codec(), bytes, format!("bad body content: {e}"))
            }),
            None if bytes.is_empty() => Ok(None),
            None => Ok(Some(Box::new(Text::from_bytes(bytes)?) as Box<dyn Message>)),
        })?;
        peer.masks = self.masks.clone();
        K::adopt(&mut peer, &self.head()?)?;
        Ok(peer)
    }

    pub(crate) fn head(&self) -> Result<Head> {
        self.head.fold(&parse_head, &apply_head)
    }

    fn serialise(&self, body: &[u8], wire: bool) -> Result<Vec<u8>> {
        let head = self.head()?;
        let mut out = K::start_line(&head).into_bytes();
        out.extend_from_slice(b"\r\n");
        for (name, value) in headers(&head) {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if wire && is_chunked(&head) {
            out.extend(enchunk(body));
        } else {
            out.extend_from_slice(body);
        }
        Ok(out)
    }
}

fn headers(head: &Head) -> BTreeMap<String, String> {
    head.iter()
        .filter_map(|(field, value)| unheader(field).map(|name| (name.to_owned(), value.to_string())))
        .collect()
}

impl<K: HttpKind> Message for HttpMessage<K> {
    fn codec(&self) -> &'static str {
        K::NAME
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<()> {
        if field == HTTP_BODY {
            self.body = match value {
                FieldValue::Delete => None,
                FieldValue::Value(Value::Text(text)) => {
                    Some(Box::new(Text::from_bytes(text.as_bytes())?) as Box<dyn Message>)
                }
                FieldValue::Value(Value::Bytes(bytes)) => {
                    Some(Box::new(Bytes::from_bytes(&bytes)?) as Box<dyn Message>)
                }
                other => return Err(MessageError::invalid_value(K::NAME, field, other.kind())),
            };
            return Ok(());
        }
        if K::owns(field) {
            super::require_scalar(K::NAME, field, &value)?;
            self.head.record(Update::new(field, value));
            return Ok(());
        }
        match &mut self.body {
            Some(body) => body.set_field(field, value),
            None => {
                warn!(codec = K::NAME, field, "No body to receive update");
                Ok(())
            }
        }
    }

    fn get(&self, field: &str) -> Result<Option<Value>> {
        if field == HTTP_BODY {
            return Ok(match &self.body {
                Some(body) => Some(Value::Bytes(body.content()?)),
                None => None,
            });
        }
        if K::owns(field) {
            return Ok(self.head()?.remove(field));
        }
        match &self.body {
            Some(body) => body.get(field),
            None => Ok(None),
        }
    }

    fn content(&self) -> Result<Vec<u8>> {
        let body = match &self.body {
            Some(body) => body.content()?,
            None => Vec::new(),
        };
        self.serialise(&body, true)
    }

    fn fields(&self) -> Result<BTreeSet<String>> {
        let head = self.head()?;
        let mut names: BTreeSet<String> = K::START.iter().map(|f| (*f).to_owned()).collect();
        names.insert(HTTP_BODY.to_owned());
        names.extend(head.keys().filter(|f| is_header_field(f)).cloned());
        names.extend(K::extra_fields(&head));
        if let Some(body) = &self.body {
            names.extend(body.fields()?);
        }
        Ok(names)
    }

    fn as_human(&self) -> Result<String> {
        let body = self.body_text()?;
        Ok(String::from_utf8_lossy(&self.serialise(body.as_bytes(), false)?).into_owned())
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

    /// Masks registered on the body are honoured along with those on the
    /// HTTP message itself.
    fn assertable(&self, sources: &[&dyn Unpredictable]) -> Result<String> {
        let selected = self.masks.select(sources);
        let mut child = self.child();
        if !selected.is_empty() {
            debug!(codec = K::NAME, masks = selected.len(), "Applying masks");
        }
        for mask in &selected {
            mask.apply_fields(&mut child)?;
        }
        let body = match &child.body {
            Some(body) => body.assertable(sources)?,
            None => String::new(),
        };
        let human = String::from_utf8_lossy(&child.serialise(body.as_bytes(), false)?).into_owned();
        Ok(selected
            .iter()
            .fold(human, |text, mask| mask.apply_text(&text)))
    }
}

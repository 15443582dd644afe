//! Codec backends and the generic message that drives them.

mod bytes;
pub mod http;
mod json;
mod query;
mod result;
mod text;
mod web;
mod xml;

pub use self::bytes::BytesCodec;
pub use self::json::JsonCodec;
pub use self::query::{QueryCodec, SQL};
pub use self::result::{Grid, ResultCodec, COLUMNS, ROW_COUNT};
pub use self::text::TextCodec;
pub use self::web::{Browser, Operation, WebSequence};
pub use self::xml::{XmlCodec, HEADER_ENCODING, HEADER_VERSION};

use crate::error::{MessageError, Result};
use crate::ledger::{Lineage, Update};
use crate::mask::{Mask, MaskRegistry};
use crate::message::{Message, Unpredictable};
use crate::value::{FieldValue, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::debug;

/// Format-specific parsing, addressing and rendering.
///
/// Implementations are stateless. All per-message state lives in [`Msg`].
pub trait Codec: Send + Sync + 'static {
    type Repr: Clone + fmt::Debug + Send + Sync + 'static;

    const NAME: &'static str;

    /// Whether byte content is parsed on every fold (true) or once at
    /// construction (false).
    const DEFERRED: bool = true;

    fn empty() -> Self::Repr;

    fn parse(bytes: &[u8]) -> Result<Self::Repr>;

    /// Checks the field syntax and value kind of an update.
    fn validate(field: &str, value: &FieldValue) -> Result<()>;

    /// Turns a `set` call into ledger entries. Most codecs record exactly one.
    fn prepare(field: &str, value: FieldValue) -> Result<Vec<Update>> {
        Self::validate(field, &value)?;
        Ok(vec![Update::new(field, value)])
    }

    fn apply(repr: &mut Self::Repr, update: &Update) -> Result<()>;

    fn access(repr: &Self::Repr, field: &str) -> Result<Option<Value>>;

    fn fields(repr: &Self::Repr) -> BTreeSet<String>;

    fn serialize(repr: &Self::Repr) -> Result<Vec<u8>>;

    fn render(repr: &Self::Repr) -> Result<String>;
}

/// A message backed by codec `C`.
pub struct Msg<C: Codec> {
    lineage: Lineage<C::Repr>,
    masks: MaskRegistry,
    codec: PhantomData<C>,
}

pub type Bytes = Msg<BytesCodec>;
pub type Text = Msg<TextCodec>;
pub type Json = Msg<JsonCodec>;
pub type Xml = Msg<XmlCodec>;
pub type Query = Msg<QueryCodec>;
pub type ResultSet = Msg<ResultCodec>;

impl<C: Codec> fmt::Debug for Msg<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Msg")
            .field("codec", &C::NAME)
            .field("lineage", &self.lineage)
            .field("masks", &self.masks)
            .finish()
    }
}

impl<C: Codec> Default for Msg<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> Msg<C> {
    /// An empty message.
    pub fn new() -> Self {
        Self::literal(C::empty())
    }

    /// A message over already-decoded content.
    pub fn literal(repr: C::Repr) -> Self {
        Self::with_lineage(Lineage::literal(repr))
    }

    /// A message over wire bytes. Deferred codecs report parse errors on first access.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let lineage = if C::DEFERRED {
            debug!(codec = C::NAME, len = bytes.len(), "Deferring parse");
            Lineage::deferred(bytes)
        } else {
            debug!(codec = C::NAME, len = bytes.len(), "Parsing");
            Lineage::literal(C::parse(bytes)?)
        };
        Ok(Self::with_lineage(lineage))
    }

    fn with_lineage(lineage: Lineage<C::Repr>) -> Self {
        Self {
            lineage,
            masks: MaskRegistry::new(),
            codec: PhantomData,
        }
    }

    /// Queues an update and returns `self` for chaining.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        self.set_field(field, value.into())?;
        Ok(self)
    }

    /// Owned form of [`Msg::set`].
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Result<Self> {
        self.set_field(field, value.into())?;
        Ok(self)
    }

    /// Composes `build` onto the mask registered for `source`.
    pub fn masking<U>(&mut self, source: &U, build: impl FnOnce(Mask) -> Mask) -> Result<&mut Self>
    where
        U: Unpredictable + ?Sized,
    {
        self.masks.register(source.tag(), build)?;
        Ok(self)
    }

    /// A message whose base is this message's live fold, with a copy of the masks.
    pub fn child(&self) -> Self {
        Self {
            lineage: self.lineage.descend(),
            masks: self.masks.clone(),
            codec: PhantomData,
        }
    }

    /// A message parsed from `content`, with a copy of the masks.
    pub fn peer(&self, content: &[u8]) -> Result<Self> {
        let mut peer = Self::from_bytes(content)?;
        peer.masks = self.masks.clone();
        Ok(peer)
    }

    /// Folds the ledger onto the base content.
    pub fn data(&self) -> Result<C::Repr> {
        self.lineage.fold(&C::parse, &C::apply)
    }
}

impl<C: Codec> Message for Msg<C> {
    fn codec(&self) -> &'static str {
        C::NAME
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<()> {
        if let FieldValue::NonFinite(_) = value {
            return Err(MessageError::invalid_value(C::NAME, field, value.kind()));
        }
        for update in C::prepare(field, value)? {
            self.lineage.record(update);
        }
        Ok(())
    }

    fn get(&self, field: &str) -> Result<Option<Value>> {
        C::access(&self.data()?, field)
    }

    fn content(&self) -> Result<Vec<u8>> {
        C::serialize(&self.data()?)
    }

    fn fields(&self) -> Result<BTreeSet<String>> {
        Ok(C::fields(&self.data()?))
    }

    fn as_human(&self) -> Result<String> {
        C::render(&self.data()?)
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

/// Codecs that can be built from bare wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum CodecKind {
    Bytes,
    Text,
    Json,
    Xml,
    Query,
    Result,
    HttpRequest,
    HttpResponse,
}

impl CodecKind {
    /// Parses `bytes` into a boxed message. HTTP bodies are held as text.
    pub fn parse(self, bytes: &[u8]) -> Result<Box<dyn Message>> {
        Ok(match self {
            CodecKind::Bytes => Box::new(Bytes::from_bytes(bytes)?),
            CodecKind::Text => Box::new(Text::from_bytes(bytes)?),
            CodecKind::Json => Box::new(Json::from_bytes(bytes)?),
            CodecKind::Xml => Box::new(Xml::from_bytes(bytes)?),
            CodecKind::Query => Box::new(Query::from_bytes(bytes)?),
            CodecKind::Result => Box::new(ResultSet::from_bytes(bytes)?),
            CodecKind::HttpRequest => Box::new(http::HttpReq::from_bytes(bytes, text_body)?),
            CodecKind::HttpResponse => Box::new(http::HttpRes::from_bytes(bytes, text_body)?),
        })
    }
}

fn text_body(bytes: &[u8]) -> Result<Option<Box<dyn Message>>> {
    Ok(Some(Box::new(Text::from_bytes(bytes)?)))
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bytes" => Ok(CodecKind::Bytes),
            "text" => Ok(CodecKind::Text),
            "json" => Ok(CodecKind::Json),
            "xml" => Ok(CodecKind::Xml),
            "query" | "sql" => Ok(CodecKind::Query),
            "result" => Ok(CodecKind::Result),
            "http-request" => Ok(CodecKind::HttpRequest),
            "http-response" => Ok(CodecKind::HttpResponse),
            other => Err(format!("Unknown codec '{other}'")),
        }
    }
}

/// Shared value-kind check for codecs that hold scalars only.
pub(crate) fn require_scalar(codec: &'static str, field: &str, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Delete => Ok(()),
        FieldValue::Value(v) if v.is_scalar() => Ok(()),
        other => Err(MessageError::invalid_value(
            codec,
            field,
            other.kind(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_kind_from_str() {
        assert_eq!("JSON".parse::<CodecKind>(), Ok(CodecKind::Json));
        assert_eq!("http-request".parse::<CodecKind>(), Ok(CodecKind::HttpRequest));
        assert!("yaml".parse::<CodecKind>().is_err());
    }

    #[test]
    fn test_factory_builds_each_kind() {
        let msg = CodecKind::Json.parse(br#"{"a":1}"#).unwrap();
        assert_eq!(msg.codec(), "json");
        assert_eq!(msg.get("a").unwrap(), Some(Value::from(1)));

        let msg = CodecKind::Bytes.parse(&[1, 2]).unwrap();
        assert_eq!(msg.content().unwrap(), vec![1, 2]);

        let msg = CodecKind::HttpResponse
            .parse(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nhello")
            .unwrap();
        assert_eq!(msg.get("HTTP_STATUS").unwrap(), Some(Value::from("200")));
    }
}

//! The contract shared by every codec.

use crate::error::Result;
use crate::mask::{Mask, MaskRegistry};
use crate::value::{FieldValue, Value};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// A category of non-deterministic data that can be masked out of a
/// human-readable rendering.
///
/// Usually implemented by a fieldless enum:
///
/// ```
/// use flow_message::Unpredictable;
///
/// #[derive(Debug)]
/// enum Unpredictables {
///     Timestamp,
///     RequestId,
/// }
///
/// impl Unpredictable for Unpredictables {
///     fn name(&self) -> String {
///         format!("{self:?}")
///     }
/// }
/// ```
pub trait Unpredictable {
    fn name(&self) -> String;

    /// Registry key. Combines the implementing type with `name()` so that
    /// sources from different enums never collide.
    fn tag(&self) -> Tag {
        Tag {
            kind: std::any::type_name::<Self>(),
            name: self.name(),
        }
    }
}

/// Comparable key under which a mask is registered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    kind: &'static str,
    name: String,
}

impl Tag {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Addressable, mutable, maskable message content.
///
/// Accessors fold the message's update ledger onto its base content every
/// time they are called. They never alter the base.
pub trait Message: Send + Sync + fmt::Debug {
    /// Name of the codec backing this message.
    fn codec(&self) -> &'static str;

    /// Queues an update. Malformed fields and unsupported values are rejected
    /// here rather than when the message is next folded.
    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<()>;

    /// Reads the value at `field`, or `None` if nothing is there.
    fn get(&self, field: &str) -> Result<Option<Value>>;

    /// Wire-format bytes.
    fn content(&self) -> Result<Vec<u8>>;

    /// Addressable leaf fields. Empty for codecs where enumeration is not meaningful.
    fn fields(&self) -> Result<BTreeSet<String>>;

    /// Deterministic human-readable rendering, without masks.
    fn as_human(&self) -> Result<String>;

    fn masks(&self) -> &MaskRegistry;

    fn masks_mut(&mut self) -> &mut MaskRegistry;

    /// A message whose base is this message's live fold.
    fn child_message(&self) -> Box<dyn Message>;

    /// A message of the same codec built from `content`, carrying a copy of the masks.
    fn peer_message(&self, content: &[u8]) -> Result<Box<dyn Message>>;

    /// Human-readable rendering with the masks for `sources` applied.
    ///
    /// Field operations of the selected masks run against a throwaway child in
    /// the order the sources are given. Text operations then run over the
    /// rendering in the same order.
    fn assertable(&self, sources: &[&dyn Unpredictable]) -> Result<String> {
        let selected = self.masks().select(sources);
        if selected.is_empty() {
            return self.as_human();
        }
        debug!(codec = self.codec(), masks = selected.len(), "Applying masks");

        let mut child = self.child_message();
        for mask in &selected {
            mask.apply_fields(child.as_mut())?;
        }
        let human = child.as_human()?;
        Ok(selected
            .iter()
            .fold(human, |text, mask| mask.apply_text(&text)))
    }
}

impl<'a> dyn Message + 'a {
    /// Chaining form of [`Message::set_field`].
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) -> Result<&mut Self> {
        self.set_field(field, value.into())?;
        Ok(self)
    }

    /// Composes `build` onto the mask registered for `source`.
    pub fn masking<U>(&mut self, source: &U, build: impl FnOnce(Mask) -> Mask) -> Result<&mut Self>
    where
        U: Unpredictable + ?Sized,
    {
        self.masks_mut().register(source.tag(), build)?;
        Ok(self)
    }
}

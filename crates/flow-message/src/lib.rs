//! Addressable, mutable, maskable message content for test flows.
//!
//! A [`Message`] wraps structured content (JSON, XML, SQL, HTTP and more)
//! behind one contract: fields are set by address, read back, enumerated,
//! serialised to wire bytes and rendered in a deterministic human-readable
//! form. Updates never mutate the base content; children see their parent's
//! updates live, and masks redact unpredictable data from the rendered form
//! without touching the wire bytes.
//!
//! # Example
//!
//! ```
//! use flow_message::codec::Json;
//! use flow_message::{Message, Unpredictable};
//!
//! struct Clock;
//!
//! impl Unpredictable for Clock {
//!     fn name(&self) -> String {
//!         "clock".into()
//!     }
//! }
//!
//! let mut request = Json::new();
//! request.set("order.id", 7)?.set("order.sent", "2030-01-01")?;
//! request.masking(&Clock, |m| m.replace("order.sent", "<date>"))?;
//!
//! let mut expected = request.child();
//! expected.set("order.id", 8)?;
//!
//! assert_eq!(request.content()?, br#"{"order":{"id":7,"sent":"2030-01-01"}}"#);
//! assert!(expected.assertable(&[&Clock])?.contains("\"sent\" : \"<date>\""));
//! # Ok::<(), flow_message::MessageError>(())
//! ```

pub mod codec;
pub mod config;
pub mod engine;
mod error;
pub mod ledger;
mod mask;
mod message;
mod value;

pub use codec::CodecKind;
pub use config::{ConfiguredSource, MaskConfig, MaskRule};
pub use error::{MessageError, Result};
pub use mask::{Mask, MaskRegistry};
pub use message::{Message, Tag, Unpredictable};
pub use value::{FieldValue, Map, Value, DELETE, EMPTY_LIST, EMPTY_MAP};

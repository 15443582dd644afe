//! Addressing engines shared by the codecs.

pub mod range;
pub mod tree;

pub use range::ByteRange;
pub use tree::{leaves, traverse, Conflict, Path, Segment, Walk};

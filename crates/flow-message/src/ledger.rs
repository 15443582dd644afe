//! Update ledgers and the base-reference chain between parents and children.
//!
//! A message never mutates its base content. Every `set` is appended to a
//! [`Ledger`], and accessors fold the ledger onto the base on demand. A
//! child's base is a live handle on its parent's basis and ledger, so parent
//! updates made after the child was created still show through.

use crate::error::Result;
use crate::value::FieldValue;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A single queued update.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Set { field: String, value: FieldValue },
    Delete { field: String },
}

impl Update {
    /// Builds an update, mapping the deletion sentinel onto `Update::Delete`.
    pub fn new(field: impl Into<String>, value: FieldValue) -> Self {
        let field = field.into();
        match value {
            FieldValue::Delete => Update::Delete { field },
            value => Update::Set { field, value },
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Update::Set { field, .. } | Update::Delete { field } => field,
        }
    }

    /// The value being written, or `None` for a deletion.
    pub fn value(&self) -> Option<&FieldValue> {
        match self {
            Update::Set { value, .. } => Some(value),
            Update::Delete { .. } => None,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Update::Delete { .. })
    }
}

/// Ordered, append-only list of updates, shared with any children.
#[derive(Clone, Default)]
pub struct Ledger(Arc<RwLock<Vec<Update>>>);

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, update: Update) {
        self.0.write().push(update);
    }

    pub fn snapshot(&self) -> Vec<Update> {
        self.0.read().clone()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.read().iter()).finish()
    }
}

/// Where a message's pre-update content comes from.
pub enum Basis<R> {
    /// Content captured at construction.
    Literal(R),
    /// Wire bytes, parsed again on every fold.
    Deferred(Arc<[u8]>),
    /// The current fold of a parent message.
    Parent(Lineage<R>),
}

impl<R: fmt::Debug> fmt::Debug for Basis<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Literal(r) => f.debug_tuple("Literal").field(r).finish(),
            Basis::Deferred(b) => write!(f, "Deferred({} bytes)", b.len()),
            Basis::Parent(p) => f.debug_tuple("Parent").field(p).finish(),
        }
    }
}

/// A basis plus the ledger recorded against it.
pub struct Lineage<R> {
    basis: Arc<Basis<R>>,
    ledger: Ledger,
}

impl<R> Clone for Lineage<R> {
    fn clone(&self) -> Self {
        Self {
            basis: Arc::clone(&self.basis),
            ledger: self.ledger.clone(),
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for Lineage<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lineage")
            .field("basis", &self.basis)
            .field("ledger", &self.ledger)
            .finish()
    }
}

impl<R> Lineage<R> {
    pub fn literal(repr: R) -> Self {
        Self::from_basis(Basis::Literal(repr))
    }

    pub fn deferred(bytes: &[u8]) -> Self {
        Self::from_basis(Basis::Deferred(Arc::from(bytes)))
    }

    fn from_basis(basis: Basis<R>) -> Self {
        Self {
            basis: Arc::new(basis),
            ledger: Ledger::new(),
        }
    }

    /// A new lineage whose base is this lineage's live fold, with an empty ledger.
    pub fn descend(&self) -> Self {
        Self::from_basis(Basis::Parent(self.clone()))
    }

    pub fn record(&self, update: Update) {
        self.ledger.push(update);
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Folds the ledger onto the basis, resolving parents first.
    pub fn fold<P, A>(&self, parse: &P, apply: &A) -> Result<R>
    where
        R: Clone,
        P: Fn(&[u8]) -> Result<R>,
        A: Fn(&mut R, &Update) -> Result<()>,
    {
        let mut repr = match self.basis.as_ref() {
            Basis::Literal(repr) => repr.clone(),
            Basis::Deferred(bytes) => parse(&bytes[..])?,
            Basis::Parent(parent) => parent.fold(parse, apply)?,
        };
        for update in self.ledger.snapshot() {
            trace!(field = update.field(), delete = update.is_delete(), "Applying update");
            apply(&mut repr, &update)?;
        }
        Ok(repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, DELETE};

    fn apply(repr: &mut Vec<String>, update: &Update) -> Result<()> {
        match update {
            Update::Set { value, .. } => repr.push(format!("{:?}", value.as_value())),
            Update::Delete { .. } => {
                repr.pop();
            }
        }
        Ok(())
    }

    fn parse(bytes: &[u8]) -> Result<Vec<String>> {
        Ok(vec![String::from_utf8_lossy(bytes).into_owned()])
    }

    #[test]
    fn test_update_maps_delete_sentinel() {
        assert!(Update::new("a", DELETE).is_delete());
        let set = Update::new("a", FieldValue::from(1));
        assert_eq!(set.field(), "a");
        assert_eq!(set.value(), Some(&FieldValue::Value(Value::from(1))));
    }

    #[test]
    fn test_child_sees_later_parent_updates() {
        let parent = Lineage::literal(vec!["base".to_string()]);
        let child = parent.descend();
        child.record(Update::new("c", FieldValue::from("child")));
        parent.record(Update::new("p", FieldValue::from("parent")));

        let folded = child.fold(&parse, &apply).unwrap();
        assert_eq!(folded.len(), 3);
        assert_eq!(parent.fold(&parse, &apply).unwrap().len(), 2);
    }

    #[test]
    fn test_deferred_basis_parses_each_fold() {
        let lineage = Lineage::deferred(b"raw");
        assert_eq!(lineage.fold(&parse, &apply).unwrap(), vec!["raw".to_string()]);
        lineage.record(Update::new("x", DELETE));
        assert!(lineage.fold(&parse, &apply).unwrap().is_empty());
    }
}

//! Compound diffs: ordered sequences of change operations.

use crate::error::GraphResult;
use crate::ops::{ChangeHandler, ChangeOp};

/// An ordered, immutable-once-shared sequence of change operations.
///
/// A compound diff is what crosses graph boundaries: the change log hands
/// one to the store-sync channel on commit, and the merge handler replays
/// one received from a peer graph. Cloning is a deep copy; a diff handed
/// out by the change log is never affected by later appends or resets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundDiff {
    ops: Vec<ChangeOp>,
}

impl CompoundDiff {
    /// Creates an empty diff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a diff from a sequence of operations.
    #[must_use]
    pub fn from_ops(ops: Vec<ChangeOp>) -> Self {
        Self { ops }
    }

    /// Appends one operation.
    pub fn add(&mut self, op: ChangeOp) {
        self.ops.push(op);
    }

    /// Appends all operations of another diff.
    pub fn extend(&mut self, other: CompoundDiff) {
        self.ops.extend(other.ops);
    }

    /// Returns the operations in recorded order.
    #[must_use]
    pub fn ops(&self) -> &[ChangeOp] {
        &self.ops
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the diff contains no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replays all operations in order against a handler.
    pub fn apply(&self, handler: &mut dyn ChangeHandler) -> GraphResult<()> {
        for op in &self.ops {
            op.apply(handler)?;
        }
        Ok(())
    }

    /// Replays inverses of all operations in reverse order.
    pub fn undo(&self, handler: &mut dyn ChangeHandler) -> GraphResult<()> {
        for op in self.ops.iter().rev() {
            op.undo(handler)?;
        }
        Ok(())
    }

    /// Iterates the operations in recorded order.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeOp> {
        self.ops.iter()
    }
}

impl IntoIterator for CompoundDiff {
    type Item = ChangeOp;
    type IntoIter = std::vec::IntoIter<ChangeOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl FromIterator<ChangeOp> for CompoundDiff {
    fn from_iter<T: IntoIterator<Item = ChangeOp>>(iter: T) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_model::{Identity, Value};

    fn id(n: i32) -> Identity {
        Identity::permanent("E", "id", n)
    }

    #[derive(Default)]
    struct Order(Vec<&'static str>);

    impl ChangeHandler for Order {
        fn node_created(&mut self, _id: &Identity) -> GraphResult<()> {
            self.0.push("created");
            Ok(())
        }

        fn node_removed(&mut self, _id: &Identity) -> GraphResult<()> {
            self.0.push("removed");
            Ok(())
        }

        fn node_id_changed(&mut self, _id: &Identity, _new_id: &Identity) -> GraphResult<()> {
            self.0.push("rekeyed");
            Ok(())
        }

        fn property_changed(
            &mut self,
            _id: &Identity,
            _property: &str,
            _old: &Value,
            _new: &Value,
        ) -> GraphResult<()> {
            self.0.push("prop");
            Ok(())
        }

        fn arc_created(
            &mut self,
            _source: &Identity,
            _target: &Identity,
            _arc: &str,
        ) -> GraphResult<()> {
            self.0.push("arc+");
            Ok(())
        }

        fn arc_deleted(
            &mut self,
            _source: &Identity,
            _target: &Identity,
            _arc: &str,
        ) -> GraphResult<()> {
            self.0.push("arc-");
            Ok(())
        }
    }

    fn sample() -> CompoundDiff {
        CompoundDiff::from_ops(vec![
            ChangeOp::NodeCreated { id: id(1) },
            ChangeOp::PropertyChanged {
                id: id(1),
                property: "name".into(),
                old: Value::Null,
                new: Value::Text("x".into()),
            },
            ChangeOp::ArcCreated {
                source: id(1),
                target: id(2),
                arc: "a".into(),
            },
        ])
    }

    #[test]
    fn apply_preserves_order() {
        let mut order = Order::default();
        sample().apply(&mut order).unwrap();
        assert_eq!(order.0, vec!["created", "prop", "arc+"]);
    }

    #[test]
    fn undo_reverses_order_and_inverts() {
        let mut order = Order::default();
        sample().undo(&mut order).unwrap();
        assert_eq!(order.0, vec!["arc-", "prop", "removed"]);
    }

    #[test]
    fn empty_diff_is_noop() {
        let diff = CompoundDiff::new();
        assert!(diff.is_empty());
        let mut order = Order::default();
        diff.apply(&mut order).unwrap();
        assert!(order.0.is_empty());
    }
}

//! Append-only log of change operations with named markers.

use crate::diff::CompoundDiff;
use crate::error::{GraphError, GraphResult};
use crate::ops::ChangeOp;
use objgraph_model::Identity;
use std::collections::HashMap;

/// An ordered, append-only sequence of change operations.
///
/// Named markers bookmark log positions, so the sub-sequence recorded after
/// a marker can be retrieved later. The log only grows between resets, which
/// keeps marker positions and previously returned diffs valid.
#[derive(Debug, Default)]
pub struct ChangeLog {
    ops: Vec<ChangeOp>,
    markers: HashMap<String, usize>,
}

impl ChangeLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    pub fn add(&mut self, op: ChangeOp) {
        self.ops.push(op);
    }

    /// Bookmarks the current log length under a tag.
    ///
    /// Setting an existing tag moves it.
    pub fn set_marker(&mut self, tag: impl Into<String>) {
        self.markers.insert(tag.into(), self.ops.len());
    }

    /// Removes a marker. Removing an absent tag is a no-op.
    pub fn remove_marker(&mut self, tag: &str) {
        self.markers.remove(tag);
    }

    /// Returns true if the tag is currently set.
    #[must_use]
    pub fn has_marker(&self, tag: &str) -> bool {
        self.markers.contains_key(tag)
    }

    /// Returns the whole log as a diff.
    ///
    /// The returned diff is detached from the log: later appends or resets
    /// do not affect it.
    #[must_use]
    pub fn diffs(&self) -> CompoundDiff {
        CompoundDiff::from_ops(self.ops.clone())
    }

    /// Returns the operations recorded after a marker.
    ///
    /// Fails if the tag is not set.
    pub fn diffs_after_marker(&self, tag: &str) -> GraphResult<CompoundDiff> {
        let position = self.marker_position(tag)?;
        Ok(CompoundDiff::from_ops(self.ops[position..].to_vec()))
    }

    /// Returns the number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if no operations are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of operations recorded after a marker.
    pub fn len_after_marker(&self, tag: &str) -> GraphResult<usize> {
        Ok(self.ops.len() - self.marker_position(tag)?)
    }

    /// Removes every operation that references the given identity, either
    /// as its primary subject or as an arc endpoint.
    ///
    /// Used when an id is invalidated before reaching the store, e.g. when
    /// a NEW object is deleted: purging its create operation guarantees the
    /// store never sees an insert for it.
    pub fn unregister_node(&mut self, id: &Identity) {
        self.ops.retain(|op| !op.references(id));
        // Markers may now point past the end; clamp so later range queries
        // stay in bounds.
        let len = self.ops.len();
        for position in self.markers.values_mut() {
            *position = (*position).min(len);
        }
    }

    /// Clears the sequence and all markers.
    pub fn reset(&mut self) {
        // Fresh backing storage; diffs handed out earlier own their data
        // and stay valid.
        self.ops = Vec::new();
        self.markers.clear();
    }

    fn marker_position(&self, tag: &str) -> GraphResult<usize> {
        self.markers
            .get(tag)
            .copied()
            .ok_or_else(|| GraphError::marker_not_set(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i32) -> Identity {
        Identity::permanent("E", "id", n)
    }

    fn created(n: i32) -> ChangeOp {
        ChangeOp::NodeCreated { id: id(n) }
    }

    #[test]
    fn append_and_size() {
        let mut log = ChangeLog::new();
        assert!(log.is_empty());
        log.add(created(1));
        log.add(created(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn marker_captures_operations_after_it() {
        let mut log = ChangeLog::new();
        log.add(created(1));
        log.set_marker("m");
        log.add(created(2));
        log.add(created(3));

        let after = log.diffs_after_marker("m").unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(log.len_after_marker("m").unwrap(), 2);
    }

    #[test]
    fn marker_views_are_stable_under_later_appends() {
        let mut log = ChangeLog::new();
        log.set_marker("m");
        log.add(created(1));
        log.add(created(2));

        let view = log.diffs_after_marker("m").unwrap();
        log.add(created(3));
        log.add(created(4));

        // The previously returned view keeps its length.
        assert_eq!(view.len(), 2);
        // A fresh query sees everything.
        assert_eq!(log.diffs_after_marker("m").unwrap().len(), 4);
    }

    #[test]
    fn missing_marker_is_an_error() {
        let log = ChangeLog::new();
        assert!(matches!(
            log.diffs_after_marker("nope"),
            Err(GraphError::MarkerNotSet { .. })
        ));
        assert!(matches!(
            log.len_after_marker("nope"),
            Err(GraphError::MarkerNotSet { .. })
        ));
    }

    #[test]
    fn remove_marker() {
        let mut log = ChangeLog::new();
        log.set_marker("m");
        assert!(log.has_marker("m"));
        log.remove_marker("m");
        assert!(!log.has_marker("m"));
        // Removing again is fine.
        log.remove_marker("m");
    }

    #[test]
    fn reset_clears_ops_and_markers() {
        let mut log = ChangeLog::new();
        log.add(created(1));
        log.set_marker("m");
        log.reset();
        assert!(log.is_empty());
        assert!(!log.has_marker("m"));
    }

    #[test]
    fn reset_does_not_invalidate_earlier_views() {
        let mut log = ChangeLog::new();
        log.add(created(1));
        log.add(created(2));

        let view = log.diffs();
        log.reset();

        assert_eq!(view.len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn unregister_node_purges_referencing_ops() {
        let mut log = ChangeLog::new();
        log.add(created(1));
        log.add(ChangeOp::ArcCreated {
            source: id(2),
            target: id(1),
            arc: "a".into(),
        });
        log.add(created(3));

        log.unregister_node(&id(1));

        assert_eq!(log.len(), 1);
        assert!(log.diffs().ops()[0].references(&id(3)));
    }

    #[test]
    fn unregister_node_clamps_markers() {
        let mut log = ChangeLog::new();
        log.add(created(1));
        log.add(created(1));
        log.set_marker("m");

        log.unregister_node(&id(1));

        // Marker pointed at position 2, log is now empty.
        assert_eq!(log.len_after_marker("m").unwrap(), 0);
    }
}

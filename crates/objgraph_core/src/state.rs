//! Dirty-node bookkeeping since the last commit.

use objgraph_model::Identity;
use std::collections::HashSet;

/// Tracks which nodes have pending changes since the last commit.
///
/// The state log answers "which nodes does the next commit touch" without
/// scanning the registry; the authoritative per-node state lives on the
/// nodes themselves.
#[derive(Debug, Default)]
pub struct StateLog {
    dirty: HashSet<Identity>,
}

impl StateLog {
    /// Creates an empty state log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a node dirty.
    pub fn mark_dirty(&mut self, id: &Identity) {
        self.dirty.insert(id.clone());
    }

    /// Drops bookkeeping for a node, e.g. when it is unregistered.
    pub fn forget(&mut self, id: &Identity) {
        self.dirty.remove(id);
    }

    /// Returns true if the node is marked dirty.
    #[must_use]
    pub fn is_dirty(&self, id: &Identity) -> bool {
        self.dirty.contains(id)
    }

    /// Iterates dirty node ids in unspecified order.
    pub fn dirty_ids(&self) -> impl Iterator<Item = &Identity> {
        self.dirty.iter()
    }

    /// Returns the number of dirty nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dirty.len()
    }

    /// Returns true if no node is dirty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Removes and returns all dirty ids.
    pub fn take_dirty(&mut self) -> Vec<Identity> {
        self.dirty.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i32) -> Identity {
        Identity::permanent("E", "id", n)
    }

    #[test]
    fn mark_and_forget() {
        let mut log = StateLog::new();
        log.mark_dirty(&id(1));
        assert!(log.is_dirty(&id(1)));

        log.forget(&id(1));
        assert!(!log.is_dirty(&id(1)));
        assert!(log.is_empty());
    }

    #[test]
    fn marking_twice_is_idempotent() {
        let mut log = StateLog::new();
        log.mark_dirty(&id(1));
        log.mark_dirty(&id(1));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn take_dirty_drains() {
        let mut log = StateLog::new();
        log.mark_dirty(&id(1));
        log.mark_dirty(&id(2));

        let taken = log.take_dirty();
        assert_eq!(taken.len(), 2);
        assert!(log.is_empty());
    }
}

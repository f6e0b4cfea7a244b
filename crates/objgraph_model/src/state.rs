//! Per-node persistence lifecycle state.

use std::fmt;

/// Lifecycle state of a persistent node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistenceState {
    /// Not tracked by any graph (never registered, or a deleted NEW object).
    Transient,
    /// Created locally, not yet stored.
    New,
    /// In sync with the store.
    Committed,
    /// Committed, then changed locally.
    Modified,
    /// Registered by id only; property data not loaded yet.
    Hollow,
    /// Scheduled for deletion from the store.
    Deleted,
}

impl PersistenceState {
    /// Returns true if the node carries uncommitted changes.
    #[must_use]
    pub fn is_dirty(self) -> bool {
        matches!(
            self,
            PersistenceState::New | PersistenceState::Modified | PersistenceState::Deleted
        )
    }

    /// Returns the state after an edit to a clean node.
    ///
    /// `Committed` becomes `Modified`; every other state is already as dirty
    /// as it can get (or not tracked at all) and is left unchanged.
    #[must_use]
    pub fn after_edit(self) -> PersistenceState {
        match self {
            PersistenceState::Committed => PersistenceState::Modified,
            other => other,
        }
    }
}

impl fmt::Display for PersistenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PersistenceState::Transient => "transient",
            PersistenceState::New => "new",
            PersistenceState::Committed => "committed",
            PersistenceState::Modified => "modified",
            PersistenceState::Hollow => "hollow",
            PersistenceState::Deleted => "deleted",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_becomes_modified_on_edit() {
        assert_eq!(
            PersistenceState::Committed.after_edit(),
            PersistenceState::Modified
        );
    }

    #[test]
    fn maximally_dirty_states_are_stable() {
        assert_eq!(PersistenceState::New.after_edit(), PersistenceState::New);
        assert_eq!(
            PersistenceState::Deleted.after_edit(),
            PersistenceState::Deleted
        );
        assert_eq!(
            PersistenceState::Modified.after_edit(),
            PersistenceState::Modified
        );
    }

    #[test]
    fn dirty_classification() {
        assert!(PersistenceState::New.is_dirty());
        assert!(PersistenceState::Modified.is_dirty());
        assert!(PersistenceState::Deleted.is_dirty());
        assert!(!PersistenceState::Committed.is_dirty());
        assert!(!PersistenceState::Hollow.is_dirty());
        assert!(!PersistenceState::Transient.is_dirty());
    }
}

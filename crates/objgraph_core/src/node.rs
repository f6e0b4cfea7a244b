//! In-memory persistent nodes.

use objgraph_model::{Identity, PersistenceState, Value};
use std::collections::HashMap;

/// A property slot on a node.
///
/// Relationships hold [`Identity`] handles rather than node references, so
/// cyclic graphs need no special ownership treatment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Scalar attribute value.
    Scalar(Value),
    /// To-one relationship target.
    ToOne(Option<Identity>),
    /// To-many relationship targets, in insertion order.
    ToMany(Vec<Identity>),
}

/// A live in-memory persistent object tracked by the graph manager.
///
/// Exactly one identity per node; the identity field is only rewritten by
/// the merge handler, together with the registry re-keying.
#[derive(Debug, Clone)]
pub struct GraphNode {
    id: Identity,
    state: PersistenceState,
    values: HashMap<String, PropertyValue>,
}

impl GraphNode {
    /// Creates a node with no property data.
    #[must_use]
    pub fn new(id: Identity, state: PersistenceState) -> Self {
        Self {
            id,
            state,
            values: HashMap::new(),
        }
    }

    /// Returns the node's identity.
    #[must_use]
    pub fn id(&self) -> &Identity {
        &self.id
    }

    /// Returns the persistence state.
    #[must_use]
    pub fn state(&self) -> PersistenceState {
        self.state
    }

    /// Reads a scalar property. Unset properties read as `Value::Null`.
    #[must_use]
    pub fn scalar(&self, property: &str) -> Value {
        match self.values.get(property) {
            Some(PropertyValue::Scalar(v)) => v.clone(),
            _ => Value::Null,
        }
    }

    /// Reads a to-one relationship target.
    #[must_use]
    pub fn to_one(&self, property: &str) -> Option<Identity> {
        match self.values.get(property) {
            Some(PropertyValue::ToOne(target)) => target.clone(),
            _ => None,
        }
    }

    /// Reads a to-many relationship as an owned snapshot.
    ///
    /// Callers iterate the snapshot while mutating the live relationship,
    /// so this always copies.
    #[must_use]
    pub fn to_many(&self, property: &str) -> Vec<Identity> {
        match self.values.get(property) {
            Some(PropertyValue::ToMany(targets)) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Iterates all set property slots.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub(crate) fn set_id(&mut self, id: Identity) {
        self.id = id;
    }

    pub(crate) fn set_state(&mut self, state: PersistenceState) {
        self.state = state;
    }

    /// Applies the committed-to-modified transition for an edit.
    pub(crate) fn mark_edited(&mut self) {
        self.state = self.state.after_edit();
    }

    pub(crate) fn set_scalar(&mut self, property: &str, value: Value) {
        self.values
            .insert(property.to_owned(), PropertyValue::Scalar(value));
    }

    pub(crate) fn set_to_one(&mut self, property: &str, target: Option<Identity>) {
        self.values
            .insert(property.to_owned(), PropertyValue::ToOne(target));
    }

    /// Adds a target to a to-many slot, ignoring duplicates.
    pub(crate) fn add_to_many(&mut self, property: &str, target: Identity) {
        match self.values.get_mut(property) {
            Some(PropertyValue::ToMany(targets)) => {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            _ => {
                self.values
                    .insert(property.to_owned(), PropertyValue::ToMany(vec![target]));
            }
        }
    }

    pub(crate) fn remove_to_many(&mut self, property: &str, target: &Identity) {
        if let Some(PropertyValue::ToMany(targets)) = self.values.get_mut(property) {
            targets.retain(|t| t != target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> GraphNode {
        GraphNode::new(Identity::temporary("Artist"), PersistenceState::New)
    }

    #[test]
    fn unset_scalar_reads_as_null() {
        assert!(node().scalar("name").is_null());
    }

    #[test]
    fn scalar_roundtrip() {
        let mut n = node();
        n.set_scalar("name", Value::Text("Dali".into()));
        assert_eq!(n.scalar("name"), Value::Text("Dali".into()));
    }

    #[test]
    fn to_many_deduplicates() {
        let mut n = node();
        let p = Identity::permanent("Painting", "id", 1);
        n.add_to_many("paintings", p.clone());
        n.add_to_many("paintings", p.clone());
        assert_eq!(n.to_many("paintings").len(), 1);

        n.remove_to_many("paintings", &p);
        assert!(n.to_many("paintings").is_empty());
    }

    #[test]
    fn to_many_snapshot_is_detached() {
        let mut n = node();
        let p = Identity::permanent("Painting", "id", 1);
        n.add_to_many("paintings", p.clone());

        let snapshot = n.to_many("paintings");
        n.remove_to_many("paintings", &p);

        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn mark_edited_only_moves_committed() {
        let mut n = node();
        n.set_state(PersistenceState::Committed);
        n.mark_edited();
        assert_eq!(n.state(), PersistenceState::Modified);

        n.set_state(PersistenceState::Deleted);
        n.mark_edited();
        assert_eq!(n.state(), PersistenceState::Deleted);
    }
}

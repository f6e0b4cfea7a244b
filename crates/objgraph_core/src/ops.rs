//! Change operations: single recorded graph mutations.

use crate::error::GraphResult;
use objgraph_model::{Identity, Value};

/// Receiver for replayed change operations.
///
/// Each [`ChangeOp`] variant maps onto exactly one callback. Implementors
/// include the merge replay (applies remote diffs through the graph action)
/// and the direct applier used for rollback-by-undo.
pub trait ChangeHandler {
    /// A node was created.
    fn node_created(&mut self, id: &Identity) -> GraphResult<()>;

    /// A node was scheduled for removal.
    fn node_removed(&mut self, id: &Identity) -> GraphResult<()>;

    /// A node's identity was replaced, usually temporary to permanent.
    fn node_id_changed(&mut self, id: &Identity, new_id: &Identity) -> GraphResult<()>;

    /// A scalar property changed.
    fn property_changed(
        &mut self,
        id: &Identity,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> GraphResult<()>;

    /// A relationship arc was created.
    fn arc_created(&mut self, source: &Identity, target: &Identity, arc: &str) -> GraphResult<()>;

    /// A relationship arc was deleted.
    fn arc_deleted(&mut self, source: &Identity, target: &Identity, arc: &str) -> GraphResult<()>;
}

/// A single recorded graph mutation.
///
/// Operations are immutable once constructed. They can be replayed against
/// any [`ChangeHandler`] and can replay their logical inverse, which is how
/// rollback unwinds in-memory state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOp {
    /// A node was created.
    NodeCreated {
        /// Identity of the created node.
        id: Identity,
    },
    /// A node was scheduled for removal.
    NodeRemoved {
        /// Identity of the removed node.
        id: Identity,
    },
    /// A node's identity was replaced.
    NodeIdChanged {
        /// Identity before the change.
        id: Identity,
        /// Identity after the change.
        new_id: Identity,
    },
    /// A scalar property changed.
    PropertyChanged {
        /// Identity of the changed node.
        id: Identity,
        /// Property name.
        property: String,
        /// Value before the change.
        old: Value,
        /// Value after the change.
        new: Value,
    },
    /// A relationship arc was created.
    ArcCreated {
        /// Arc source node.
        source: Identity,
        /// Arc target node.
        target: Identity,
        /// Relationship name on the source entity.
        arc: String,
    },
    /// A relationship arc was deleted.
    ArcDeleted {
        /// Arc source node.
        source: Identity,
        /// Arc target node.
        target: Identity,
        /// Relationship name on the source entity.
        arc: String,
    },
}

impl ChangeOp {
    /// Replays this operation against a handler.
    pub fn apply(&self, handler: &mut dyn ChangeHandler) -> GraphResult<()> {
        match self {
            ChangeOp::NodeCreated { id } => handler.node_created(id),
            ChangeOp::NodeRemoved { id } => handler.node_removed(id),
            ChangeOp::NodeIdChanged { id, new_id } => handler.node_id_changed(id, new_id),
            ChangeOp::PropertyChanged {
                id,
                property,
                old,
                new,
            } => handler.property_changed(id, property, old, new),
            ChangeOp::ArcCreated { source, target, arc } => {
                handler.arc_created(source, target, arc)
            }
            ChangeOp::ArcDeleted { source, target, arc } => {
                handler.arc_deleted(source, target, arc)
            }
        }
    }

    /// Replays the logical inverse of this operation against a handler.
    pub fn undo(&self, handler: &mut dyn ChangeHandler) -> GraphResult<()> {
        match self {
            ChangeOp::NodeCreated { id } => handler.node_removed(id),
            ChangeOp::NodeRemoved { id } => handler.node_created(id),
            ChangeOp::NodeIdChanged { id, new_id } => handler.node_id_changed(new_id, id),
            ChangeOp::PropertyChanged {
                id,
                property,
                old,
                new,
            } => handler.property_changed(id, property, new, old),
            ChangeOp::ArcCreated { source, target, arc } => {
                handler.arc_deleted(source, target, arc)
            }
            ChangeOp::ArcDeleted { source, target, arc } => {
                handler.arc_created(source, target, arc)
            }
        }
    }

    /// Returns true if this operation references the given identity,
    /// either as its primary subject or as an arc endpoint.
    #[must_use]
    pub fn references(&self, id: &Identity) -> bool {
        match self {
            ChangeOp::NodeCreated { id: subject }
            | ChangeOp::NodeRemoved { id: subject }
            | ChangeOp::PropertyChanged { id: subject, .. } => subject == id,
            ChangeOp::NodeIdChanged { id: old, new_id } => old == id || new_id == id,
            ChangeOp::ArcCreated { source, target, .. }
            | ChangeOp::ArcDeleted { source, target, .. } => source == id || target == id,
        }
    }

    /// Returns the primary subject of this operation.
    #[must_use]
    pub fn subject(&self) -> &Identity {
        match self {
            ChangeOp::NodeCreated { id }
            | ChangeOp::NodeRemoved { id }
            | ChangeOp::NodeIdChanged { id, .. }
            | ChangeOp::PropertyChanged { id, .. } => id,
            ChangeOp::ArcCreated { source, .. } | ChangeOp::ArcDeleted { source, .. } => source,
        }
    }
}

//! Validated local mutations with bidirectional relationship propagation.

use crate::error::{GraphError, GraphResult};
use crate::manager::GraphManager;
use crate::node::GraphNode;
use objgraph_model::{Identity, PropertyDescriptor, Schema, Value};
use std::collections::HashMap;

/// The identity-to-node map shared by the manager and the appliers.
pub(crate) type Registry = HashMap<Identity, GraphNode>;

/// Reentrancy guard for relationship propagation.
///
/// While the reverse side of an arc change is being written, the guard is
/// raised so a reentrant mutation through the same context does not
/// propagate again and ping-pong between the two ends. The caller owns the
/// guard and threads it through every relationship mutation in one logical
/// operation.
#[derive(Debug, Default)]
pub struct ArcContext {
    in_progress: bool,
}

impl ArcContext {
    /// Creates a lowered guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a reverse-side write is in progress.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }
}

/// Applies validated mutations to a graph manager.
///
/// Every successful call leaves the node map, the per-node states and the
/// change log mutually consistent: forward slot written, reverse slot
/// written one hop (unless the guard is raised), touched nodes moved to
/// their edited state, and exactly the forward operations recorded.
#[derive(Debug)]
pub struct GraphAction<'a> {
    manager: &'a mut GraphManager,
    schema: &'a Schema,
}

impl<'a> GraphAction<'a> {
    /// Binds an action to a manager and the schema it validates against.
    pub fn new(manager: &'a mut GraphManager, schema: &'a Schema) -> Self {
        Self { manager, schema }
    }

    /// Sets a scalar property.
    ///
    /// Setting a property to its current value records nothing.
    pub fn handle_scalar_change(
        &mut self,
        id: &Identity,
        property: &str,
        new: Value,
    ) -> GraphResult<()> {
        let descriptor = self.schema.property(id.entity(), property)?;
        if descriptor.is_relationship() {
            return Err(GraphError::invalid_operation(format!(
                "property '{property}' of entity '{}' is a relationship, not a scalar",
                id.entity()
            )));
        }

        let node = self
            .manager
            .node_mut(id)
            .ok_or_else(|| GraphError::not_registered(id))?;
        let old = node.scalar(property);
        if old == new {
            return Ok(());
        }

        node.set_scalar(property, new.clone());
        node.mark_edited();
        self.manager.node_property_changed(id, property, old, new);
        Ok(())
    }

    /// Points a to-one relationship at a new target (or at nothing).
    ///
    /// Records an arc deletion for the previous target and an arc creation
    /// for the new one, then writes the reverse side of both unless the
    /// guard is raised.
    pub fn handle_to_one_change(
        &mut self,
        id: &Identity,
        property: &str,
        new_target: Option<Identity>,
        cx: &mut ArcContext,
    ) -> GraphResult<()> {
        let descriptor = self.schema.property(id.entity(), property)?;
        if !matches!(descriptor, PropertyDescriptor::ToOne { .. }) {
            return Err(GraphError::invalid_operation(format!(
                "property '{property}' of entity '{}' is not a to-one relationship",
                id.entity()
            )));
        }

        let node = self
            .manager
            .node_mut(id)
            .ok_or_else(|| GraphError::not_registered(id))?;
        let old_target = node.to_one(property);
        if old_target == new_target {
            return Ok(());
        }

        node.set_to_one(property, new_target.clone());
        node.mark_edited();

        if let Some(old) = &old_target {
            self.manager.arc_deleted(id, old, property);
        }
        if let Some(new) = &new_target {
            self.manager.arc_created(id, new, property);
        }

        if !cx.in_progress {
            cx.in_progress = true;
            if let Some(old) = &old_target {
                write_reverse(self.manager.registry_mut(), self.schema, id, old, property, false)?;
            }
            if let Some(new) = &new_target {
                write_reverse(self.manager.registry_mut(), self.schema, id, new, property, true)?;
            }
            cx.in_progress = false;
        }
        Ok(())
    }

    /// Adds a target to a to-many relationship.
    ///
    /// Adding an already-present target records nothing.
    pub fn handle_to_many_add(
        &mut self,
        id: &Identity,
        property: &str,
        target: &Identity,
        cx: &mut ArcContext,
    ) -> GraphResult<()> {
        self.handle_to_many_change(id, property, target, true, cx)
    }

    /// Removes a target from a to-many relationship.
    ///
    /// Removing an absent target records nothing.
    pub fn handle_to_many_remove(
        &mut self,
        id: &Identity,
        property: &str,
        target: &Identity,
        cx: &mut ArcContext,
    ) -> GraphResult<()> {
        self.handle_to_many_change(id, property, target, false, cx)
    }

    fn handle_to_many_change(
        &mut self,
        id: &Identity,
        property: &str,
        target: &Identity,
        add: bool,
        cx: &mut ArcContext,
    ) -> GraphResult<()> {
        let descriptor = self.schema.property(id.entity(), property)?;
        if !matches!(descriptor, PropertyDescriptor::ToMany { .. }) {
            return Err(GraphError::invalid_operation(format!(
                "property '{property}' of entity '{}' is not a to-many relationship",
                id.entity()
            )));
        }

        let node = self
            .manager
            .node_mut(id)
            .ok_or_else(|| GraphError::not_registered(id))?;
        let present = node.to_many(property).contains(target);
        if present == add {
            return Ok(());
        }

        if add {
            node.add_to_many(property, target.clone());
        } else {
            node.remove_to_many(property, target);
        }
        node.mark_edited();

        if add {
            self.manager.arc_created(id, target, property);
        } else {
            self.manager.arc_deleted(id, target, property);
        }

        if !cx.in_progress {
            cx.in_progress = true;
            write_reverse(self.manager.registry_mut(), self.schema, id, target, property, add)?;
            cx.in_progress = false;
        }
        Ok(())
    }
}

/// Writes both slots of an arc directly, without validation or logging.
///
/// Used when replaying already-validated operations, e.g. unwinding a diff
/// during rollback.
pub(crate) fn write_arc(
    registry: &mut Registry,
    schema: &Schema,
    source: &Identity,
    target: &Identity,
    arc: &str,
    create: bool,
) -> GraphResult<()> {
    write_forward(registry, schema, source, target, arc, create)?;
    write_reverse(registry, schema, source, target, arc, create)
}

/// Writes the forward slot of an arc on the source node.
///
/// Tolerates a missing source node: replayed operations may reference
/// nodes this graph never materialized.
pub(crate) fn write_forward(
    registry: &mut Registry,
    schema: &Schema,
    source: &Identity,
    target: &Identity,
    arc: &str,
    create: bool,
) -> GraphResult<()> {
    let descriptor = schema.property(source.entity(), arc)?;
    let Some(node) = registry.get_mut(source) else {
        return Ok(());
    };
    match descriptor {
        PropertyDescriptor::ToOne { .. } => {
            if create {
                node.set_to_one(arc, Some(target.clone()));
            } else if node.to_one(arc).as_ref() == Some(target) {
                node.set_to_one(arc, None);
            }
        }
        PropertyDescriptor::ToMany { .. } => {
            if create {
                node.add_to_many(arc, target.clone());
            } else {
                node.remove_to_many(arc, target);
            }
        }
        PropertyDescriptor::Scalar => {
            return Err(GraphError::invalid_operation(format!(
                "arc change on scalar property '{arc}' of entity '{}'",
                source.entity()
            )));
        }
    }
    node.mark_edited();
    Ok(())
}

/// Writes the reverse slot of an arc on the target node, one hop only.
///
/// A missing reverse mapping or an unregistered target is a no-op.
pub(crate) fn write_reverse(
    registry: &mut Registry,
    schema: &Schema,
    source: &Identity,
    target: &Identity,
    arc: &str,
    create: bool,
) -> GraphResult<()> {
    let descriptor = schema.property(source.entity(), arc)?;
    let Some(reverse) = descriptor.reverse() else {
        return Ok(());
    };
    let reverse_descriptor = schema.property(target.entity(), reverse)?;
    let Some(node) = registry.get_mut(target) else {
        return Ok(());
    };
    match reverse_descriptor {
        PropertyDescriptor::ToOne { .. } => {
            if create {
                node.set_to_one(reverse, Some(source.clone()));
            } else if node.to_one(reverse).as_ref() == Some(source) {
                node.set_to_one(reverse, None);
            }
        }
        PropertyDescriptor::ToMany { .. } => {
            if create {
                node.add_to_many(reverse, source.clone());
            } else {
                node.remove_to_many(reverse, source);
            }
        }
        PropertyDescriptor::Scalar => {
            return Err(GraphError::invalid_operation(format!(
                "reverse of arc '{arc}' is scalar property '{reverse}' of entity '{}'",
                target.entity()
            )));
        }
    }
    node.mark_edited();
    Ok(())
}

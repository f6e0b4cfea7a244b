//! Replay of remote diffs into a local graph.

use crate::action::{ArcContext, GraphAction};
use crate::diff::CompoundDiff;
use crate::error::GraphResult;
use crate::event::{ChannelId, ContextId, GraphEvent};
use crate::manager::GraphManager;
use crate::node::GraphNode;
use crate::ops::ChangeHandler;
use objgraph_model::{Identity, PersistenceState, PropertyDescriptor, Schema, Value};
use std::sync::atomic::{AtomicBool, Ordering};

/// Applies diffs received from elsewhere (a parent graph, a peer, or a
/// commit confirmation) to the local graph.
///
/// Replayed operations are recorded in the local change log like any other
/// mutation, so they flow onward when this graph itself commits. Event
/// emission is suppressed for the duration of a merge: a graph never
/// re-announces changes it did not originate.
#[derive(Debug)]
pub struct MergeHandler {
    context: ContextId,
    channel: ChannelId,
    active: AtomicBool,
}

impl MergeHandler {
    /// Creates an active handler bound to a context and its channel.
    #[must_use]
    pub fn new(context: ContextId, channel: ChannelId) -> Self {
        Self {
            context,
            channel,
            active: AtomicBool::new(true),
        }
    }

    /// Returns true until [`deactivate`](Self::deactivate) is called.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Permanently deactivates this handler.
    ///
    /// Called when the owning context switches channels, so events still in
    /// flight for the old channel are dropped instead of merged.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Decides whether an event should be merged into the local graph.
    ///
    /// Only events from this handler's channel qualify, and never the
    /// graph's own echoes.
    #[must_use]
    pub fn should_process_event(&self, event: &GraphEvent) -> bool {
        self.is_active() && event.channel == Some(self.channel) && event.posted_by != self.context
    }

    /// Replays a diff into the graph with event emission suppressed.
    pub fn merge_diff(
        &self,
        manager: &mut GraphManager,
        schema: &Schema,
        diff: &CompoundDiff,
    ) -> GraphResult<()> {
        replay_diff(manager, schema, diff)
    }
}

/// Replays a diff into the graph with event emission suppressed.
///
/// The emission flags are restored afterwards even when replay fails.
pub(crate) fn replay_diff(
    manager: &mut GraphManager,
    schema: &Schema,
    diff: &CompoundDiff,
) -> GraphResult<()> {
    let (change_events, lifecycle_events) = manager.events_enabled();
    manager.set_events_enabled(false, false);

    let mut replay = MergeReplay { manager, schema };
    let result = diff.apply(&mut replay);

    manager.set_events_enabled(change_events, lifecycle_events);
    result
}

/// Replays one remote operation at a time against the local graph.
struct MergeReplay<'a> {
    manager: &'a mut GraphManager,
    schema: &'a Schema,
}

impl MergeReplay<'_> {
    /// Registers a hollow placeholder when an operation references a node
    /// this graph has not materialized.
    fn ensure_node(&mut self, id: &Identity) {
        if !self.manager.contains_node(id) {
            self.manager.register_node(
                id.clone(),
                GraphNode::new(id.clone(), PersistenceState::Hollow),
            );
        }
    }
}

impl ChangeHandler for MergeReplay<'_> {
    fn node_created(&mut self, id: &Identity) -> GraphResult<()> {
        if !self.manager.contains_node(id) {
            self.manager.register_node(
                id.clone(),
                GraphNode::new(id.clone(), PersistenceState::New),
            );
        }
        self.manager.node_created(id);
        Ok(())
    }

    fn node_removed(&mut self, id: &Identity) -> GraphResult<()> {
        if !self.manager.contains_node(id) {
            tracing::debug!(%id, "remote removal of unknown node skipped");
            return Ok(());
        }
        // Local delete rules fire for remote deletions too. The arcs the
        // remote delete broke arrive as separate operations, so by the
        // time this op replays most rules see already-cleared slots.
        crate::delete::perform_delete(self.manager, self.schema, id)?;
        Ok(())
    }

    fn node_id_changed(&mut self, id: &Identity, new_id: &Identity) -> GraphResult<()> {
        let Some(mut node) = self.manager.unregister_node(id) else {
            tracing::debug!(%id, %new_id, "remote re-key of unknown node skipped");
            return Ok(());
        };
        node.set_id(new_id.clone());
        self.manager.register_node(new_id.clone(), node);
        // The old id must stay resolvable until the next reset.
        self.manager.register_dead_id(id.clone(), new_id.clone());
        self.manager.node_id_changed(id, new_id);
        Ok(())
    }

    fn property_changed(
        &mut self,
        id: &Identity,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> GraphResult<()> {
        let Some(node) = self.manager.get_node(id) else {
            tracing::debug!(%id, property, "remote property change for unknown node skipped");
            return Ok(());
        };
        let current = node.scalar(property);
        // Optimistic check: a conflicting local edit wins over the remote
        // value.
        if current != *old && current != *new {
            tracing::debug!(
                %id,
                property,
                "local value differs from remote old value, local change takes precedence"
            );
            return Ok(());
        }
        GraphAction::new(self.manager, self.schema).handle_scalar_change(id, property, new.clone())
    }

    fn arc_created(&mut self, source: &Identity, target: &Identity, arc: &str) -> GraphResult<()> {
        self.ensure_node(source);
        self.ensure_node(target);
        let mut cx = ArcContext::new();
        let mut action = GraphAction::new(self.manager, self.schema);
        match self.schema.property(source.entity(), arc)? {
            PropertyDescriptor::ToOne { .. } => {
                action.handle_to_one_change(source, arc, Some(target.clone()), &mut cx)
            }
            _ => action.handle_to_many_add(source, arc, target, &mut cx),
        }
    }

    fn arc_deleted(&mut self, source: &Identity, target: &Identity, arc: &str) -> GraphResult<()> {
        self.ensure_node(source);
        self.ensure_node(target);
        let mut cx = ArcContext::new();
        match self.schema.property(source.entity(), arc)? {
            PropertyDescriptor::ToOne { .. } => {
                let current = self
                    .manager
                    .get_node(source)
                    .and_then(|n| n.to_one(arc));
                if current.as_ref() == Some(target) {
                    GraphAction::new(self.manager, self.schema)
                        .handle_to_one_change(source, arc, None, &mut cx)
                } else {
                    tracing::debug!(
                        %source,
                        arc,
                        "remote arc removal does not match local target, skipped"
                    );
                    Ok(())
                }
            }
            _ => GraphAction::new(self.manager, self.schema)
                .handle_to_many_remove(source, arc, target, &mut cx),
        }
    }
}

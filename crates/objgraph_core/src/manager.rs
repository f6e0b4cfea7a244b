//! The graph manager: registry, state log and change log in one place.

use crate::action::{write_arc, Registry};
use crate::changelog::ChangeLog;
use crate::diff::CompoundDiff;
use crate::error::GraphResult;
use crate::event::GraphEventKind;
use crate::node::GraphNode;
use crate::ops::{ChangeHandler, ChangeOp};
use crate::state::StateLog;
use objgraph_model::{Identity, PersistenceState, Schema, Value};
use std::collections::HashMap;

/// Change log marker set when a commit starts.
pub const COMMIT_MARKER: &str = "commit";
/// Change log marker set when changes are flushed to the parent graph.
pub const FLUSH_MARKER: &str = "flush";

/// Single source of truth for one graph: the identity-to-node registry,
/// the per-node dirty bookkeeping and the ordered change log.
///
/// The manager itself is not synchronized; [`crate::GraphContext`] owns one
/// behind a mutex and holds that lock across multi-step sequences such as
/// commit, which realizes the one-monitor-per-graph policy.
#[derive(Debug)]
pub struct GraphManager {
    registry: Registry,
    /// Dead ids: old identity -> replacement. Kept resolvable until the
    /// next reset so in-flight change operations recorded under the old
    /// id still find their node.
    aliases: HashMap<Identity, Identity>,
    change_log: ChangeLog,
    state_log: StateLog,
    change_events_enabled: bool,
    lifecycle_events_enabled: bool,
    pending_events: Vec<(GraphEventKind, CompoundDiff)>,
}

impl GraphManager {
    /// Creates an empty manager with the given event emission flags.
    #[must_use]
    pub fn new(change_events_enabled: bool, lifecycle_events_enabled: bool) -> Self {
        Self {
            registry: HashMap::new(),
            aliases: HashMap::new(),
            change_log: ChangeLog::new(),
            state_log: StateLog::new(),
            change_events_enabled,
            lifecycle_events_enabled,
            pending_events: Vec::new(),
        }
    }

    // ---- registry ----

    /// Registers a node under an identity, replacing any previous mapping.
    pub fn register_node(&mut self, id: Identity, node: GraphNode) {
        self.registry.insert(id, node);
    }

    /// Removes a node from the registry, returning it if present.
    pub fn unregister_node(&mut self, id: &Identity) -> Option<GraphNode> {
        self.state_log.forget(id);
        self.aliases.remove(id);
        self.registry.remove(id)
    }

    /// Resolves a node by identity, following dead-id aliases.
    #[must_use]
    pub fn get_node(&self, id: &Identity) -> Option<&GraphNode> {
        match self.registry.get(id) {
            Some(node) => Some(node),
            None => self
                .aliases
                .get(id)
                .and_then(|replacement| self.registry.get(replacement)),
        }
    }

    /// Resolves a node mutably, following dead-id aliases.
    pub fn node_mut(&mut self, id: &Identity) -> Option<&mut GraphNode> {
        let key = if self.registry.contains_key(id) {
            id.clone()
        } else {
            self.aliases.get(id)?.clone()
        };
        self.registry.get_mut(&key)
    }

    /// Returns true if the identity resolves to a registered node.
    #[must_use]
    pub fn contains_node(&self, id: &Identity) -> bool {
        self.get_node(id).is_some()
    }

    /// Returns the number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Iterates registered identities in unspecified order.
    pub fn registered_ids(&self) -> impl Iterator<Item = &Identity> {
        self.registry.keys()
    }

    pub(crate) fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    // ---- raw mutation notifications ----

    /// Records a node creation.
    pub fn node_created(&mut self, id: &Identity) {
        self.record(ChangeOp::NodeCreated { id: id.clone() });
    }

    /// Records a node removal.
    pub fn node_removed(&mut self, id: &Identity) {
        self.record(ChangeOp::NodeRemoved { id: id.clone() });
    }

    /// Records an identity replacement.
    ///
    /// The registry re-keying itself is done by the merge handler; the
    /// dirty mark goes on the new id since that is the node's key from
    /// here on.
    pub fn node_id_changed(&mut self, id: &Identity, new_id: &Identity) {
        self.state_log.mark_dirty(new_id);
        self.append(ChangeOp::NodeIdChanged {
            id: id.clone(),
            new_id: new_id.clone(),
        });
    }

    /// Records a scalar property change.
    pub fn node_property_changed(&mut self, id: &Identity, property: &str, old: Value, new: Value) {
        self.record(ChangeOp::PropertyChanged {
            id: id.clone(),
            property: property.to_owned(),
            old,
            new,
        });
    }

    /// Records an arc creation.
    pub fn arc_created(&mut self, id: &Identity, target: &Identity, arc: &str) {
        self.record(ChangeOp::ArcCreated {
            source: id.clone(),
            target: target.clone(),
            arc: arc.to_owned(),
        });
    }

    /// Records an arc deletion.
    pub fn arc_deleted(&mut self, id: &Identity, target: &Identity, arc: &str) {
        self.record(ChangeOp::ArcDeleted {
            source: id.clone(),
            target: target.clone(),
            arc: arc.to_owned(),
        });
    }

    fn record(&mut self, op: ChangeOp) {
        self.state_log.mark_dirty(op.subject());
        // The reverse side of an arc change is edited too, without an
        // operation of its own.
        if let ChangeOp::ArcCreated { target, .. } | ChangeOp::ArcDeleted { target, .. } = &op {
            self.state_log.mark_dirty(target);
        }
        self.append(op);
    }

    fn append(&mut self, op: ChangeOp) {
        if self.change_events_enabled {
            self.pending_events.push((
                GraphEventKind::Changed,
                CompoundDiff::from_ops(vec![op.clone()]),
            ));
        }
        self.change_log.add(op);
    }

    // ---- change scopes ----

    /// Returns true if any operations were recorded since the last reset.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.change_log.is_empty()
    }

    /// Returns true if operations were recorded since the last flush, or
    /// since the last reset when no flush happened.
    #[must_use]
    pub fn has_changes_since_last_flush(&self) -> bool {
        if self.change_log.has_marker(FLUSH_MARKER) {
            self.change_log
                .len_after_marker(FLUSH_MARKER)
                .map(|n| n > 0)
                .unwrap_or(false)
        } else {
            self.has_changes()
        }
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn diffs(&self) -> CompoundDiff {
        self.change_log.diffs()
    }

    /// Returns operations recorded since the last flush, or everything
    /// when no flush happened.
    #[must_use]
    pub fn diffs_since_last_flush(&self) -> CompoundDiff {
        if self.change_log.has_marker(FLUSH_MARKER) {
            self.change_log
                .diffs_after_marker(FLUSH_MARKER)
                .unwrap_or_default()
        } else {
            self.diffs()
        }
    }

    /// Returns dirty node ids, optionally filtered by persistence state.
    #[must_use]
    pub fn dirty_nodes(&self, filter: Option<PersistenceState>) -> Vec<Identity> {
        self.state_log
            .dirty_ids()
            .filter(|id| match filter {
                None => true,
                Some(state) => self.get_node(id).map(|n| n.state()) == Some(state),
            })
            .cloned()
            .collect()
    }

    pub(crate) fn change_log_mut(&mut self) -> &mut ChangeLog {
        &mut self.change_log
    }

    pub(crate) fn state_log_mut(&mut self) -> &mut StateLog {
        &mut self.state_log
    }

    // ---- commit lifecycle ----

    /// Marks the start of a commit.
    pub fn graph_commit_started(&mut self) {
        tracing::debug!(ops = self.change_log.len(), "graph commit started");
        self.change_log.set_marker(COMMIT_MARKER);
    }

    /// Unwinds a failed commit.
    ///
    /// Only the marker is removed; recorded operations are retained so the
    /// caller can retry.
    pub fn graph_commit_aborted(&mut self) {
        tracing::debug!("graph commit aborted, changes retained");
        self.change_log.remove_marker(COMMIT_MARKER);
    }

    /// Finalizes a successful commit.
    ///
    /// Clears dirty flags (new/modified nodes become committed, deleted
    /// nodes leave the registry), resets the change log and purges dead
    /// ids. If lifecycle events are enabled, the operations recorded after
    /// the commit marker are queued as a flushed event.
    pub fn graph_committed(&mut self) {
        let event_diff = if self.change_log.has_marker(COMMIT_MARKER) {
            self.change_log
                .diffs_after_marker(COMMIT_MARKER)
                .unwrap_or_default()
        } else {
            CompoundDiff::new()
        };

        for id in self.state_log.take_dirty() {
            let key = self.aliases.get(&id).cloned().unwrap_or(id);
            let Some(state) = self.registry.get(&key).map(|n| n.state()) else {
                continue;
            };
            match state {
                PersistenceState::New | PersistenceState::Modified => {
                    if let Some(node) = self.registry.get_mut(&key) {
                        node.set_state(PersistenceState::Committed);
                    }
                }
                PersistenceState::Deleted => {
                    self.registry.remove(&key);
                }
                _ => {}
            }
        }

        self.reset();
        tracing::debug!(nodes = self.registry.len(), "graph committed");

        if self.lifecycle_events_enabled {
            self.pending_events
                .push((GraphEventKind::Flushed, event_diff));
        }
    }

    /// Marks a flush to the parent graph without clearing anything.
    pub fn graph_flushed(&mut self) {
        tracing::debug!(ops = self.change_log.len(), "graph flushed to parent");
        self.change_log.set_marker(FLUSH_MARKER);
    }

    /// Unwinds all recorded changes by applying the inverse diff, reverts
    /// node states and resets the log.
    pub fn graph_reverted(&mut self, schema: &Schema) -> GraphResult<()> {
        let diff = self.change_log.diffs();
        {
            let mut applier = DirectApplier {
                registry: &mut self.registry,
                schema,
            };
            diff.undo(&mut applier)?;
        }

        for id in self.state_log.take_dirty() {
            let key = self.aliases.get(&id).cloned().unwrap_or(id);
            let Some(state) = self.registry.get(&key).map(|n| n.state()) else {
                continue;
            };
            match state {
                // Never committed: reverting means it stops existing.
                PersistenceState::New => {
                    self.registry.remove(&key);
                }
                PersistenceState::Modified | PersistenceState::Deleted => {
                    if let Some(node) = self.registry.get_mut(&key) {
                        node.set_state(PersistenceState::Committed);
                    }
                }
                _ => {}
            }
        }

        self.reset();
        tracing::debug!(ops = diff.len(), "graph reverted");

        if self.lifecycle_events_enabled {
            self.pending_events
                .push((GraphEventKind::RolledBack, diff));
        }
        Ok(())
    }

    // ---- dead ids ----

    /// Records an identity replacement: the old id stays resolvable (as an
    /// alias of the new one) until the next reset.
    pub fn register_dead_id(&mut self, old: Identity, replacement: Identity) {
        self.aliases.insert(old, replacement);
    }

    /// Iterates ids pending purge at the next reset.
    pub fn dead_ids(&self) -> impl Iterator<Item = &Identity> {
        self.aliases.keys()
    }

    /// Clears the change log and purges dead-id aliases.
    pub fn reset(&mut self) {
        self.change_log.reset();
        self.aliases.clear();
    }

    // ---- events ----

    /// Returns true if per-mutation change events are emitted.
    #[must_use]
    pub fn change_events_enabled(&self) -> bool {
        self.change_events_enabled
    }

    /// Returns true if commit/rollback lifecycle events are emitted.
    #[must_use]
    pub fn lifecycle_events_enabled(&self) -> bool {
        self.lifecycle_events_enabled
    }

    pub(crate) fn events_enabled(&self) -> (bool, bool) {
        (self.change_events_enabled, self.lifecycle_events_enabled)
    }

    pub(crate) fn set_events_enabled(&mut self, change: bool, lifecycle: bool) {
        self.change_events_enabled = change;
        self.lifecycle_events_enabled = lifecycle;
    }

    pub(crate) fn take_pending_events(&mut self) -> Vec<(GraphEventKind, CompoundDiff)> {
        std::mem::take(&mut self.pending_events)
    }
}

/// Applies change operations directly to the registry, bypassing the graph
/// action and the change log.
///
/// Driven through [`CompoundDiff::undo`] this unwinds in-memory state
/// during rollback: it receives already-inverted callbacks, so it only has
/// to write what it is told.
struct DirectApplier<'a> {
    registry: &'a mut Registry,
    schema: &'a Schema,
}

impl ChangeHandler for DirectApplier<'_> {
    fn node_created(&mut self, id: &Identity) -> GraphResult<()> {
        if !self.registry.contains_key(id) {
            self.registry.insert(
                id.clone(),
                GraphNode::new(id.clone(), PersistenceState::Hollow),
            );
        }
        Ok(())
    }

    fn node_removed(&mut self, id: &Identity) -> GraphResult<()> {
        self.registry.remove(id);
        Ok(())
    }

    fn node_id_changed(&mut self, id: &Identity, new_id: &Identity) -> GraphResult<()> {
        if let Some(mut node) = self.registry.remove(id) {
            node.set_id(new_id.clone());
            self.registry.insert(new_id.clone(), node);
        }
        Ok(())
    }

    fn property_changed(
        &mut self,
        id: &Identity,
        property: &str,
        _old: &Value,
        new: &Value,
    ) -> GraphResult<()> {
        if let Some(node) = self.registry.get_mut(id) {
            node.set_scalar(property, new.clone());
        }
        Ok(())
    }

    fn arc_created(&mut self, source: &Identity, target: &Identity, arc: &str) -> GraphResult<()> {
        write_arc(self.registry, self.schema, source, target, arc, true)
    }

    fn arc_deleted(&mut self, source: &Identity, target: &Identity, arc: &str) -> GraphResult<()> {
        write_arc(self.registry, self.schema, source, target, arc, false)
    }
}

//! The graph context: the user-facing facade over one object graph.

use crate::action::{ArcContext, GraphAction};
use crate::channel::{SyncChannel, SyncKind};
use crate::delete::perform_delete;
use crate::diff::CompoundDiff;
use crate::error::{GraphError, GraphResult};
use crate::event::{ChannelId, ContextId, GraphEvent, GraphEventHub, GraphEventKind};
use crate::manager::GraphManager;
use crate::merge::{replay_diff, MergeHandler};
use crate::node::GraphNode;
use objgraph_model::{Identity, ModelError, PersistenceState, Schema, Value};
use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Event emission switches for a new context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextConfig {
    /// Emit an event for every recorded mutation.
    pub change_events_enabled: bool,
    /// Emit events for commit and rollback.
    pub lifecycle_events_enabled: bool,
}

struct CtxState {
    manager: GraphManager,
    channel: Option<Arc<dyn SyncChannel>>,
    merge: Option<Arc<MergeHandler>>,
}

/// One tracked object graph with commit, flush and rollback lifecycle.
///
/// A context is internally synchronized behind a single lock, held across
/// whole logical operations: commit keeps it from the has-changes check
/// through the channel round trip to the final bookkeeping, so concurrent
/// callers see the graph either before or after, never mid-commit.
///
/// Events are emitted after the lock is released.
pub struct GraphContext {
    id: ContextId,
    schema: Arc<Schema>,
    state: Mutex<CtxState>,
    events: GraphEventHub,
}

impl GraphContext {
    /// Creates a detached context over the given schema.
    ///
    /// Attach a channel with [`set_channel`](Self::set_channel) before
    /// committing.
    #[must_use]
    pub fn new(schema: Arc<Schema>, config: ContextConfig) -> Self {
        Self {
            id: ContextId::next(),
            schema,
            state: Mutex::new(CtxState {
                manager: GraphManager::new(
                    config.change_events_enabled,
                    config.lifecycle_events_enabled,
                ),
                channel: None,
                merge: None,
            }),
            events: GraphEventHub::new(),
        }
    }

    /// Returns this context's process-unique id.
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.id
    }

    /// Returns the schema this context validates against.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Subscribes to this context's events.
    pub fn subscribe(&self) -> Receiver<GraphEvent> {
        self.events.subscribe()
    }

    /// Attaches a sync channel, replacing any previous one.
    ///
    /// The merge handler of the previous channel is deactivated, so events
    /// still in flight for it are dropped instead of merged.
    pub fn set_channel(&self, channel: Arc<dyn SyncChannel>) {
        let mut state = self.state.lock();
        if let Some(old) = &state.merge {
            old.deactivate();
        }
        state.merge = Some(Arc::new(MergeHandler::new(self.id, channel.id())));
        state.channel = Some(channel);
    }

    /// Returns the id of the attached channel, if any.
    #[must_use]
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.state.lock().channel.as_ref().map(|c| c.id())
    }

    /// Returns the merge handler of the attached channel, if any.
    #[must_use]
    pub fn merge_handler(&self) -> Option<Arc<MergeHandler>> {
        self.state.lock().merge.clone()
    }

    // ---- object lifecycle ----

    /// Creates a new object with a temporary identity.
    pub fn new_object(&self, entity: &str) -> GraphResult<Identity> {
        if !self.schema.has_entity(entity) {
            return Err(ModelError::unknown_entity(entity).into());
        }
        let id = Identity::temporary(entity);
        self.run_locked(|state| {
            state.manager.register_node(
                id.clone(),
                GraphNode::new(id.clone(), PersistenceState::New),
            );
            state.manager.node_created(&id);
            Ok(())
        })?;
        Ok(id)
    }

    /// Registers an object known to exist in the store without recording a
    /// change.
    ///
    /// With property values the node is registered committed; without, as a
    /// hollow placeholder. A hollow node is upgraded in place; a node in
    /// any other state is left alone.
    pub fn materialize(
        &self,
        id: &Identity,
        values: impl IntoIterator<Item = (String, Value)>,
    ) -> GraphResult<()> {
        if !self.schema.has_entity(id.entity()) {
            return Err(ModelError::unknown_entity(id.entity()).into());
        }
        let mut state = self.state.lock();
        match state.manager.get_node(id).map(|n| n.state()) {
            None | Some(PersistenceState::Hollow) => {}
            Some(_) => return Ok(()),
        }

        // Validate the whole snapshot before touching the registry, so a
        // bad property name leaves any existing hollow node in place.
        let mut snapshot = Vec::new();
        for (property, value) in values {
            self.schema.property(id.entity(), &property)?;
            snapshot.push((property, value));
        }

        let mut node = match state.manager.unregister_node(id) {
            Some(existing) => existing,
            None => GraphNode::new(id.clone(), PersistenceState::Hollow),
        };
        let any = !snapshot.is_empty();
        for (property, value) in snapshot {
            node.set_scalar(&property, value);
        }
        if any {
            node.set_state(PersistenceState::Committed);
        }
        state.manager.register_node(id.clone(), node);
        Ok(())
    }

    /// Deletes an object, applying mapped delete rules.
    ///
    /// Returns false if it was already transient or deleted.
    pub fn delete_object(&self, id: &Identity) -> GraphResult<bool> {
        self.run_locked(|state| perform_delete(&mut state.manager, &self.schema, id))
    }

    // ---- reads ----

    /// Returns true if the identity resolves to a registered node.
    #[must_use]
    pub fn is_registered(&self, id: &Identity) -> bool {
        self.state.lock().manager.contains_node(id)
    }

    /// Returns the persistence state of a node.
    #[must_use]
    pub fn node_state(&self, id: &Identity) -> Option<PersistenceState> {
        self.state.lock().manager.get_node(id).map(|n| n.state())
    }

    /// Reads a scalar property.
    pub fn scalar(&self, id: &Identity, property: &str) -> GraphResult<Value> {
        let state = self.state.lock();
        let node = state
            .manager
            .get_node(id)
            .ok_or_else(|| GraphError::not_registered(id))?;
        Ok(node.scalar(property))
    }

    /// Reads a to-one relationship target.
    pub fn to_one(&self, id: &Identity, property: &str) -> GraphResult<Option<Identity>> {
        let state = self.state.lock();
        let node = state
            .manager
            .get_node(id)
            .ok_or_else(|| GraphError::not_registered(id))?;
        Ok(node.to_one(property))
    }

    /// Reads a to-many relationship as an owned snapshot.
    pub fn to_many(&self, id: &Identity, property: &str) -> GraphResult<Vec<Identity>> {
        let state = self.state.lock();
        let node = state
            .manager
            .get_node(id)
            .ok_or_else(|| GraphError::not_registered(id))?;
        Ok(node.to_many(property))
    }

    /// Returns dirty node ids, optionally filtered by state.
    #[must_use]
    pub fn dirty_nodes(&self, filter: Option<PersistenceState>) -> Vec<Identity> {
        self.state.lock().manager.dirty_nodes(filter)
    }

    // ---- writes ----

    /// Sets a scalar property.
    pub fn set_scalar(
        &self,
        id: &Identity,
        property: &str,
        value: impl Into<Value>,
    ) -> GraphResult<()> {
        let value = value.into();
        self.run_locked(|state| {
            GraphAction::new(&mut state.manager, &self.schema)
                .handle_scalar_change(id, property, value)
        })
    }

    /// Points a to-one relationship at a new target, maintaining the
    /// reverse side.
    pub fn set_to_one(
        &self,
        id: &Identity,
        property: &str,
        target: Option<Identity>,
    ) -> GraphResult<()> {
        self.run_locked(|state| {
            let mut cx = ArcContext::new();
            GraphAction::new(&mut state.manager, &self.schema)
                .handle_to_one_change(id, property, target, &mut cx)
        })
    }

    /// Adds a target to a to-many relationship, maintaining the reverse
    /// side.
    pub fn add_to_many(&self, id: &Identity, property: &str, target: &Identity) -> GraphResult<()> {
        self.run_locked(|state| {
            let mut cx = ArcContext::new();
            GraphAction::new(&mut state.manager, &self.schema)
                .handle_to_many_add(id, property, target, &mut cx)
        })
    }

    /// Removes a target from a to-many relationship, maintaining the
    /// reverse side.
    pub fn remove_to_many(
        &self,
        id: &Identity,
        property: &str,
        target: &Identity,
    ) -> GraphResult<()> {
        self.run_locked(|state| {
            let mut cx = ArcContext::new();
            GraphAction::new(&mut state.manager, &self.schema)
                .handle_to_many_remove(id, property, target, &mut cx)
        })
    }

    // ---- change introspection ----

    /// Returns true if any changes were recorded since the last commit or
    /// rollback.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.state.lock().manager.has_changes()
    }

    /// Returns true if changes were recorded since the last flush.
    #[must_use]
    pub fn has_changes_since_last_flush(&self) -> bool {
        self.state.lock().manager.has_changes_since_last_flush()
    }

    /// Returns all changes recorded since the last commit or rollback.
    #[must_use]
    pub fn diffs(&self) -> CompoundDiff {
        self.state.lock().manager.diffs()
    }

    /// Returns changes recorded since the last flush.
    #[must_use]
    pub fn diffs_since_last_flush(&self) -> CompoundDiff {
        self.state.lock().manager.diffs_since_last_flush()
    }

    // ---- lifecycle ----

    /// Commits accumulated changes through the channel, cascading to the
    /// store.
    ///
    /// A graph without changes commits trivially without touching the
    /// channel. On success the returned confirmation diff (usually
    /// temporary-to-permanent id replacements) has already been merged into
    /// this graph. On channel failure the change log is retained and the
    /// commit can be retried.
    pub fn commit_changes(&self) -> GraphResult<Option<CompoundDiff>> {
        self.run_locked(|state| {
            // Guard on the full log: flushed changes are still pending
            // commit even when nothing new was recorded since the flush.
            // Only the payload is narrowed to the since-flush slice.
            if !state.manager.has_changes() {
                return Ok(None);
            }
            let channel = state.channel.clone().ok_or(GraphError::NoChannel)?;

            state.manager.graph_commit_started();
            let diff = state.manager.diffs_since_last_flush();
            match channel.on_sync(self.id, diff, SyncKind::FlushCascade) {
                Err(err) => {
                    state.manager.graph_commit_aborted();
                    Err(GraphError::from_channel(err))
                }
                Ok(confirmation) => {
                    if !confirmation.is_empty() {
                        if let Err(err) =
                            replay_diff(&mut state.manager, &self.schema, &confirmation)
                        {
                            state.manager.graph_commit_aborted();
                            return Err(err);
                        }
                    }
                    state.manager.graph_committed();
                    Ok(if confirmation.is_empty() {
                        None
                    } else {
                        Some(confirmation)
                    })
                }
            }
        })
    }

    /// Flushes accumulated changes one level up without committing there.
    ///
    /// Flushed changes stay in the local change log (so a later rollback
    /// still unwinds them), but are not re-sent by the next flush or
    /// commit.
    pub fn commit_changes_to_parent(&self) -> GraphResult<()> {
        self.run_locked(|state| {
            if !state.manager.has_changes() {
                return Ok(());
            }
            let channel = state.channel.clone().ok_or(GraphError::NoChannel)?;

            let diff = state.manager.diffs_since_last_flush();
            match channel.on_sync(self.id, diff, SyncKind::FlushNoCascade) {
                Err(err) => Err(GraphError::from_channel(err)),
                Ok(confirmation) => {
                    if !confirmation.is_empty() {
                        replay_diff(&mut state.manager, &self.schema, &confirmation)?;
                    }
                    state.manager.graph_flushed();
                    Ok(())
                }
            }
        })
    }

    /// Discards accumulated changes here and at every level above.
    pub fn rollback_changes(&self) -> GraphResult<()> {
        self.run_locked(|state| {
            if !state.manager.has_changes() {
                return Ok(());
            }
            let diff = state.manager.diffs();
            state.manager.graph_reverted(&self.schema)?;
            if let Some(channel) = state.channel.clone() {
                channel
                    .on_sync(self.id, diff, SyncKind::RollbackCascade)
                    .map_err(GraphError::from_channel)?;
            }
            Ok(())
        })
    }

    /// Discards accumulated changes in this graph only.
    pub fn rollback_changes_locally(&self) -> GraphResult<()> {
        self.run_locked(|state| {
            if !state.manager.has_changes() {
                return Ok(());
            }
            state.manager.graph_reverted(&self.schema)
        })
    }

    // ---- merging ----

    /// Merges an externally produced diff into this graph.
    ///
    /// Replayed operations are recorded locally and flow onward on the
    /// next commit. No events are emitted for merged changes.
    pub fn merge_diff(&self, diff: &CompoundDiff) -> GraphResult<()> {
        self.run_locked(|state| replay_diff(&mut state.manager, &self.schema, diff))
    }

    /// Offers an event from elsewhere to this graph.
    ///
    /// The merge handler of the attached channel decides whether it
    /// qualifies: only events from this graph's channel are merged, and
    /// never the graph's own echoes. Returns true if the event was merged.
    ///
    /// A merged event is re-published to this context's subscribers under
    /// the original poster, when lifecycle events are enabled.
    pub fn process_event(&self, event: &GraphEvent) -> GraphResult<bool> {
        let Some(merge) = self.merge_handler() else {
            return Ok(false);
        };
        if !merge.should_process_event(event) {
            return Ok(false);
        }

        let (result, emit, channel_id) = {
            let mut state = self.state.lock();
            let result = merge.merge_diff(&mut state.manager, &self.schema, &event.diff);
            let emit = state.manager.lifecycle_events_enabled();
            let channel_id = state.channel.as_ref().map(|c| c.id());
            (result, emit, channel_id)
        };
        result?;

        if emit {
            self.events.emit(GraphEvent {
                kind: GraphEventKind::Changed,
                diff: event.diff.clone(),
                posted_by: event.posted_by,
                channel: channel_id,
            });
        }
        Ok(true)
    }

    /// Runs a closure under the graph lock, then emits any events it
    /// queued.
    fn run_locked<T>(&self, f: impl FnOnce(&mut CtxState) -> GraphResult<T>) -> GraphResult<T> {
        let (result, pending, channel_id) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            let pending = state.manager.take_pending_events();
            let channel_id = state.channel.as_ref().map(|c| c.id());
            (result, pending, channel_id)
        };
        for (kind, diff) in pending {
            self.events.emit(GraphEvent {
                kind,
                diff,
                posted_by: self.id,
                channel: channel_id,
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_model::DeleteRule;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .entity("Artist", |e| {
                    e.scalar("name").to_many(
                        "paintings",
                        "Painting",
                        Some("artist"),
                        DeleteRule::Cascade,
                    )
                })
                .entity("Painting", |e| {
                    e.scalar("title").to_one(
                        "artist",
                        "Artist",
                        Some("paintings"),
                        DeleteRule::Nullify,
                    )
                })
                .build(),
        )
    }

    fn context() -> GraphContext {
        GraphContext::new(schema(), ContextConfig::default())
    }

    #[test]
    fn new_object_is_temporary_and_new() {
        let ctx = context();
        let id = ctx.new_object("Artist").unwrap();
        assert!(id.is_temporary());
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::New));
        assert!(ctx.has_changes());
    }

    #[test]
    fn new_object_of_unknown_entity_fails() {
        let ctx = context();
        assert!(matches!(
            ctx.new_object("Gallery"),
            Err(GraphError::Model(_))
        ));
    }

    #[test]
    fn materialize_registers_without_changes() {
        let ctx = context();
        let id = Identity::permanent("Artist", "id", 1);
        ctx.materialize(&id, [("name".to_owned(), Value::Text("Dali".into()))])
            .unwrap();

        assert_eq!(ctx.node_state(&id), Some(PersistenceState::Committed));
        assert_eq!(ctx.scalar(&id, "name").unwrap(), Value::Text("Dali".into()));
        assert!(!ctx.has_changes());
    }

    #[test]
    fn materialize_without_values_is_hollow() {
        let ctx = context();
        let id = Identity::permanent("Artist", "id", 1);
        ctx.materialize(&id, []).unwrap();
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::Hollow));
    }

    #[test]
    fn materialize_upgrades_hollow_but_not_modified() {
        let ctx = context();
        let id = Identity::permanent("Artist", "id", 1);
        ctx.materialize(&id, []).unwrap();

        ctx.materialize(&id, [("name".to_owned(), Value::Text("Dali".into()))])
            .unwrap();
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::Committed));

        ctx.set_scalar(&id, "name", "edited").unwrap();
        ctx.materialize(&id, [("name".to_owned(), Value::Text("stale".into()))])
            .unwrap();
        // A local edit is never clobbered by a late snapshot.
        assert_eq!(ctx.scalar(&id, "name").unwrap(), Value::Text("edited".into()));
    }

    #[test]
    fn failed_materialize_leaves_hollow_node_registered() {
        let ctx = context();
        let id = Identity::permanent("Artist", "id", 1);
        ctx.materialize(&id, []).unwrap();

        let err = ctx
            .materialize(&id, [("bogus".to_owned(), Value::Int(1))])
            .unwrap_err();
        assert!(matches!(err, GraphError::Model(_)));
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::Hollow));
    }

    #[test]
    fn relationship_writes_maintain_both_sides() {
        let ctx = context();
        let a = ctx.new_object("Artist").unwrap();
        let p = ctx.new_object("Painting").unwrap();

        ctx.set_to_one(&p, "artist", Some(a.clone())).unwrap();
        assert_eq!(ctx.to_many(&a, "paintings").unwrap(), vec![p.clone()]);

        ctx.remove_to_many(&a, "paintings", &p).unwrap();
        assert_eq!(ctx.to_one(&p, "artist").unwrap(), None);
    }

    #[test]
    fn commit_without_changes_skips_channel() {
        // No channel attached: would fail if the channel were consulted.
        let ctx = context();
        assert!(ctx.commit_changes().unwrap().is_none());
    }

    #[test]
    fn commit_with_changes_requires_channel() {
        let ctx = context();
        ctx.new_object("Artist").unwrap();
        assert!(matches!(
            ctx.commit_changes(),
            Err(GraphError::NoChannel)
        ));
        // Still retryable.
        assert!(ctx.has_changes());
    }

    /// Store stub whose first confirmation references an arc the schema
    /// does not know, so replaying it fails.
    struct SkewedStore {
        id: ChannelId,
        skewed: std::sync::atomic::AtomicBool,
    }

    impl SyncChannel for SkewedStore {
        fn id(&self) -> ChannelId {
            self.id
        }

        fn on_sync(
            &self,
            _source: ContextId,
            _diff: CompoundDiff,
            _kind: SyncKind,
        ) -> Result<CompoundDiff, crate::error::ChannelError> {
            if self.skewed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                Ok(CompoundDiff::from_ops(vec![crate::ops::ChangeOp::ArcCreated {
                    source: Identity::permanent("Artist", "id", 1),
                    target: Identity::permanent("Painting", "id", 1),
                    arc: "bogus".into(),
                }]))
            } else {
                Ok(CompoundDiff::new())
            }
        }
    }

    #[test]
    fn bad_confirmation_aborts_commit_and_allows_retry() {
        let ctx = context();
        ctx.set_channel(Arc::new(SkewedStore {
            id: ChannelId::next(),
            skewed: std::sync::atomic::AtomicBool::new(true),
        }));
        let id = ctx.new_object("Artist").unwrap();

        assert!(matches!(ctx.commit_changes(), Err(GraphError::Model(_))));
        // The commit never finalized: changes are retained for retry.
        assert!(ctx.has_changes());
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::New));

        assert!(ctx.commit_changes().unwrap().is_none());
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::Committed));
        assert!(!ctx.has_changes());
    }

    #[test]
    fn local_rollback_restores_values() {
        let ctx = context();
        let id = Identity::permanent("Artist", "id", 1);
        ctx.materialize(&id, [("name".to_owned(), Value::Text("old".into()))])
            .unwrap();

        ctx.set_scalar(&id, "name", "new").unwrap();
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::Modified));

        ctx.rollback_changes_locally().unwrap();
        assert_eq!(ctx.scalar(&id, "name").unwrap(), Value::Text("old".into()));
        assert_eq!(ctx.node_state(&id), Some(PersistenceState::Committed));
        assert!(!ctx.has_changes());
    }

    #[test]
    fn rollback_discards_new_objects() {
        let ctx = context();
        let id = ctx.new_object("Artist").unwrap();
        ctx.rollback_changes().unwrap();
        assert!(!ctx.is_registered(&id));
        assert!(!ctx.has_changes());
    }

    #[test]
    fn change_events_are_emitted_outside_the_lock() {
        let ctx = GraphContext::new(
            schema(),
            ContextConfig {
                change_events_enabled: true,
                lifecycle_events_enabled: false,
            },
        );
        let rx = ctx.subscribe();

        let id = ctx.new_object("Artist").unwrap();
        ctx.set_scalar(&id, "name", "Dali").unwrap();

        let first = rx.recv().unwrap();
        assert_eq!(first.kind, GraphEventKind::Changed);
        assert_eq!(first.posted_by, ctx.context_id());
        let second = rx.recv().unwrap();
        assert_eq!(second.diff.len(), 1);
    }

    #[test]
    fn merged_diffs_emit_no_events() {
        let ctx = GraphContext::new(
            schema(),
            ContextConfig {
                change_events_enabled: true,
                lifecycle_events_enabled: true,
            },
        );
        let rx = ctx.subscribe();
        let id = Identity::permanent("Artist", "id", 1);
        ctx.materialize(&id, [("name".to_owned(), Value::Null)])
            .unwrap();

        let diff = CompoundDiff::from_ops(vec![crate::ops::ChangeOp::PropertyChanged {
            id: id.clone(),
            property: "name".into(),
            old: Value::Null,
            new: Value::Int(7),
        }]);
        ctx.merge_diff(&diff).unwrap();

        assert_eq!(ctx.scalar(&id, "name").unwrap(), Value::Int(7));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn process_event_without_channel_declines() {
        let ctx = context();
        let event = GraphEvent {
            kind: GraphEventKind::Changed,
            diff: CompoundDiff::new(),
            posted_by: ContextId::next(),
            channel: None,
        };
        assert!(!ctx.process_event(&event).unwrap());
    }
}

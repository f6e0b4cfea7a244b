//! The sync channel seam between a graph and its store.

use crate::context::GraphContext;
use crate::diff::CompoundDiff;
use crate::error::ChannelError;
use crate::event::{ChannelId, ContextId};
use std::sync::Arc;

/// How far a sync request propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// Push accumulated changes one level up without committing there.
    FlushNoCascade,
    /// Commit: push changes and cascade all the way to the store.
    FlushCascade,
    /// Roll back: discard changes here and at every level above.
    RollbackCascade,
}

/// A graph's downstream collaborator: the store adapter, or another graph
/// acting as the parent of a nested one.
///
/// `on_sync` receives the caller's accumulated diff and returns a
/// confirmation diff, typically temporary-to-permanent id replacements. An
/// empty confirmation is valid. Implementations are free to fail with
/// their own error types; [`crate::GraphError::from_channel`] normalizes
/// them on the way back.
pub trait SyncChannel: Send + Sync {
    /// Returns this channel's process-unique id, used to tag events.
    fn id(&self) -> ChannelId;

    /// Handles a sync request from the given source context.
    fn on_sync(
        &self,
        source: ContextId,
        diff: CompoundDiff,
        kind: SyncKind,
    ) -> Result<CompoundDiff, ChannelError>;
}

/// Makes a [`GraphContext`] act as the channel of a nested child context.
///
/// Child flushes merge into the parent; a cascading child commit also
/// commits the parent, relaying the store confirmation back down so the
/// child re-keys its temporary ids too.
pub struct ContextChannel {
    parent: Arc<GraphContext>,
    id: ChannelId,
}

impl ContextChannel {
    /// Wraps a parent context as a channel.
    #[must_use]
    pub fn new(parent: Arc<GraphContext>) -> Self {
        Self {
            parent,
            id: ChannelId::next(),
        }
    }

    /// Returns the parent context.
    #[must_use]
    pub fn parent(&self) -> &Arc<GraphContext> {
        &self.parent
    }
}

impl SyncChannel for ContextChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn on_sync(
        &self,
        source: ContextId,
        diff: CompoundDiff,
        kind: SyncKind,
    ) -> Result<CompoundDiff, ChannelError> {
        tracing::debug!(%source, ?kind, ops = diff.len(), "child sync request");
        match kind {
            SyncKind::FlushNoCascade => {
                self.parent.merge_diff(&diff).map_err(into_channel_error)?;
                Ok(CompoundDiff::new())
            }
            SyncKind::FlushCascade => {
                self.parent.merge_diff(&diff).map_err(into_channel_error)?;
                let confirmation = self
                    .parent
                    .commit_changes()
                    .map_err(into_channel_error)?;
                Ok(confirmation.unwrap_or_default())
            }
            SyncKind::RollbackCascade => {
                self.parent
                    .rollback_changes()
                    .map_err(into_channel_error)?;
                Ok(CompoundDiff::new())
            }
        }
    }
}

fn into_channel_error(err: crate::error::GraphError) -> ChannelError {
    Box::new(err)
}

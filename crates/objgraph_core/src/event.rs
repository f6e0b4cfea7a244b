//! Graph change events and the subscriber hub.
//!
//! Events are observability only: a graph without subscribers behaves
//! identically. Events are emitted after the mutating call returns, never
//! while the graph lock is held.

use crate::diff::CompoundDiff;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::RwLock;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a graph context, used as the "posted by"
/// marker on events so a graph can recognize its own echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates the next context id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx:{}", self.0)
    }
}

/// Process-unique identifier of a sync channel, used as the event origin
/// marker for upstream filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocates the next channel id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan:{}", self.0)
    }
}

/// Kind of graph event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEventKind {
    /// One or more local mutations were recorded.
    Changed,
    /// Accumulated changes were flushed (committed) upstream.
    Flushed,
    /// Accumulated changes were rolled back.
    RolledBack,
}

/// A graph event carrying the diff that caused it.
#[derive(Debug, Clone)]
pub struct GraphEvent {
    /// What happened.
    pub kind: GraphEventKind,
    /// The operations involved.
    pub diff: CompoundDiff,
    /// Context that posted the event.
    pub posted_by: ContextId,
    /// Channel the posting context was attached to, if any.
    pub channel: Option<ChannelId>,
}

/// Distributes graph events to subscribers.
///
/// Multiple subscribers are supported; disconnected receivers are pruned
/// on the next emit. Delivery is best-effort.
#[derive(Debug, Default)]
pub struct GraphEventHub {
    subscribers: RwLock<Vec<Sender<GraphEvent>>>,
}

impl GraphEventHub {
    /// Creates a hub with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> Receiver<GraphEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all subscribers, dropping disconnected ones.
    pub fn emit(&self, event: GraphEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

//! An in-memory sync channel playing the store's role.

use objgraph_core::{
    ChangeOp, ChannelError, ChannelId, CompoundDiff, ContextId, SyncChannel, SyncKind,
};
use parking_lot::Mutex;
use thiserror::Error;

/// Error returned when a [`RecordingChannel`] is told to fail.
#[derive(Debug, Error)]
#[error("store rejected sync: {reason}")]
pub struct StoreRejected {
    /// Why the store refused the request.
    pub reason: String,
}

/// One observed sync request.
#[derive(Debug, Clone)]
pub struct SyncRecord {
    /// Context that issued the request.
    pub source: ContextId,
    /// Propagation mode of the request.
    pub kind: SyncKind,
    /// The diff that was sent.
    pub diff: CompoundDiff,
}

/// A sync channel that records every request and answers cascading
/// flushes with a store-style confirmation: each created node with a
/// temporary id is assigned the next sequential primary key.
///
/// Failures can be injected with [`fail_next`](Self::fail_next) to
/// exercise commit error paths.
pub struct RecordingChannel {
    id: ChannelId,
    inner: Mutex<Inner>,
}

struct Inner {
    records: Vec<SyncRecord>,
    next_pk: i64,
    fail_next: Option<String>,
}

impl RecordingChannel {
    /// Creates a channel with no recorded requests, keys starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ChannelId::next(),
            inner: Mutex::new(Inner {
                records: Vec::new(),
                next_pk: 1,
                fail_next: None,
            }),
        }
    }

    /// Makes the next sync request fail with the given reason.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.inner.lock().fail_next = Some(reason.into());
    }

    /// Returns a snapshot of all recorded requests.
    #[must_use]
    pub fn records(&self) -> Vec<SyncRecord> {
        self.inner.lock().records.clone()
    }

    /// Returns the number of recorded requests.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns the last recorded request, if any.
    #[must_use]
    pub fn last_record(&self) -> Option<SyncRecord> {
        self.inner.lock().records.last().cloned()
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncChannel for RecordingChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn on_sync(
        &self,
        source: ContextId,
        diff: CompoundDiff,
        kind: SyncKind,
    ) -> Result<CompoundDiff, ChannelError> {
        let mut inner = self.inner.lock();
        if let Some(reason) = inner.fail_next.take() {
            return Err(Box::new(StoreRejected { reason }));
        }

        let mut confirmation = CompoundDiff::new();
        if kind == SyncKind::FlushCascade {
            for op in diff.iter() {
                if let ChangeOp::NodeCreated { id } = op {
                    if id.is_temporary() {
                        id.push_replacement("id", inner.next_pk);
                        inner.next_pk += 1;
                        confirmation.add(ChangeOp::NodeIdChanged {
                            id: id.clone(),
                            new_id: id.create_replacement(),
                        });
                    }
                }
            }
        }

        inner.records.push(SyncRecord { source, kind, diff });
        Ok(confirmation)
    }
}

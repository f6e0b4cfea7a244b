//! # objgraph core
//!
//! Change tracking and synchronization for in-memory object graphs.
//!
//! A [`GraphContext`] tracks a set of nodes identified by
//! [`Identity`](objgraph_model::Identity) handles. Every mutation is
//! recorded as a [`ChangeOp`] in an append-only change log, from which the
//! context derives commit payloads, rollback and event notifications:
//!
//! - [`GraphContext::commit_changes`] pushes the accumulated diff through
//!   the attached [`SyncChannel`] to the store and merges the confirmation
//!   (typically temporary-to-permanent id replacements) back in.
//! - [`GraphContext::rollback_changes`] unwinds in-memory state by
//!   replaying the inverse diff.
//! - [`MergeHandler`] replays diffs produced elsewhere, with local changes
//!   taking precedence on conflict.
//!
//! Contexts nest: a [`ContextChannel`] lets one context act as the store
//! of another, so child commits flow through the parent.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod changelog;
mod channel;
mod context;
mod delete;
mod diff;
mod error;
mod event;
mod manager;
mod merge;
mod node;
mod ops;
mod state;

pub use action::{ArcContext, GraphAction};
pub use changelog::ChangeLog;
pub use channel::{ContextChannel, SyncChannel, SyncKind};
pub use context::{ContextConfig, GraphContext};
pub use delete::perform_delete;
pub use diff::CompoundDiff;
pub use error::{ChannelError, GraphError, GraphResult};
pub use event::{ChannelId, ContextId, GraphEvent, GraphEventHub, GraphEventKind};
pub use manager::{GraphManager, COMMIT_MARKER, FLUSH_MARKER};
pub use merge::MergeHandler;
pub use node::{GraphNode, PropertyValue};
pub use ops::{ChangeHandler, ChangeOp};
pub use state::StateLog;

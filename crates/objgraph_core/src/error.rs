//! Error types for the graph core.

use objgraph_model::{Identity, ModelError};
use thiserror::Error;

/// Errors surfaced by a store-sync collaborator.
///
/// Channels are free to fail with their own error types; the graph core
/// wraps anything that is not already a [`GraphError`] into
/// [`GraphError::CommitFailed`].
pub type ChannelError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for graph core operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur in graph core operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Schema lookup failed.
    #[error("schema error: {0}")]
    Model(#[from] ModelError),

    /// A DENY-rule relationship still has related objects at delete time.
    ///
    /// Recoverable: the object's state is rolled back to what it was
    /// before the delete attempt.
    #[error("delete denied: relationship {relationship} still has {related} related object(s)")]
    DeleteDenied {
        /// Relationship whose rule denied the delete.
        relationship: String,
        /// Number of related objects found.
        related: usize,
    },

    /// The node is not registered in this graph.
    #[error("node not registered in this graph: {id}")]
    NotRegistered {
        /// Identity that could not be resolved.
        id: Identity,
    },

    /// A change-log marker was queried before being set.
    #[error("change log marker not set: {tag}")]
    MarkerNotSet {
        /// Marker tag that was looked up.
        tag: String,
    },

    /// Commit, flush or rollback was attempted without an attached channel.
    #[error("no sync channel attached to this graph")]
    NoChannel,

    /// The store-sync collaborator failed during commit, flush or rollback.
    ///
    /// Accumulated change log entries are retained so the caller may retry.
    #[error("sync failed: {source}")]
    CommitFailed {
        /// The underlying channel error.
        #[source]
        source: ChannelError,
    },

    /// Operation not permitted for the given node or property.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl GraphError {
    /// Creates a delete-denied error.
    pub fn delete_denied(relationship: impl Into<String>, related: usize) -> Self {
        Self::DeleteDenied {
            relationship: relationship.into(),
            related,
        }
    }

    /// Creates a not-registered error.
    pub fn not_registered(id: &Identity) -> Self {
        Self::NotRegistered { id: id.clone() }
    }

    /// Creates a marker-not-set error.
    pub fn marker_not_set(tag: impl Into<String>) -> Self {
        Self::MarkerNotSet { tag: tag.into() }
    }

    /// Creates an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a channel error, unwrapping it first if it already is a
    /// [`GraphError`].
    pub fn from_channel(err: ChannelError) -> Self {
        match err.downcast::<GraphError>() {
            Ok(native) => *native,
            Err(foreign) => Self::CommitFailed { source: foreign },
        }
    }
}

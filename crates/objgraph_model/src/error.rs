//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by schema lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// No entity with the given name is mapped in the schema.
    #[error("unknown entity: {name}")]
    UnknownEntity {
        /// Name of the entity that was looked up.
        name: String,
    },

    /// The entity exists but has no property with the given name.
    #[error("unknown property {property} on entity {entity}")]
    UnknownProperty {
        /// Entity that was looked up.
        entity: String,
        /// Property that was not found.
        property: String,
    },
}

impl ModelError {
    /// Creates an unknown entity error.
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Creates an unknown property error.
    pub fn unknown_property(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }
}

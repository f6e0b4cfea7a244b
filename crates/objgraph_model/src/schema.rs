//! Entity mapping metadata.
//!
//! The core treats this as a read-only lookup service: given an entity name
//! and a property name, it answers "scalar or relationship?", and for
//! relationships, the reverse property and delete rule. Nothing in the core
//! ever mutates a schema after construction.

use crate::{ModelError, ModelResult};
use std::collections::HashMap;
use std::fmt;

/// What happens to related objects when the owning object is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteRule {
    /// Leave related objects untouched.
    #[default]
    NoAction,
    /// Refuse the delete while related objects exist.
    Deny,
    /// Clear the reverse side of the relationship on each related object.
    Nullify,
    /// Delete related objects too, recursively.
    Cascade,
}

impl fmt::Display for DeleteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeleteRule::NoAction => "no-action",
            DeleteRule::Deny => "deny",
            DeleteRule::Nullify => "nullify",
            DeleteRule::Cascade => "cascade",
        };
        write!(f, "{name}")
    }
}

/// Classification of a mapped property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyDescriptor {
    /// Plain scalar attribute.
    Scalar,
    /// To-one relationship.
    ToOne {
        /// Entity on the far side of the arc.
        target: String,
        /// Reverse property on the target entity, if mapped.
        reverse: Option<String>,
        /// Rule applied to the related object when the owner is deleted.
        delete_rule: DeleteRule,
    },
    /// To-many relationship.
    ToMany {
        /// Entity on the far side of the arc.
        target: String,
        /// Reverse property on the target entity, if mapped.
        reverse: Option<String>,
        /// Rule applied to related objects when the owner is deleted.
        delete_rule: DeleteRule,
    },
}

impl PropertyDescriptor {
    /// Returns true for `ToOne` and `ToMany`.
    #[must_use]
    pub fn is_relationship(&self) -> bool {
        !matches!(self, PropertyDescriptor::Scalar)
    }

    /// Returns the reverse property name for relationships.
    #[must_use]
    pub fn reverse(&self) -> Option<&str> {
        match self {
            PropertyDescriptor::Scalar => None,
            PropertyDescriptor::ToOne { reverse, .. }
            | PropertyDescriptor::ToMany { reverse, .. } => reverse.as_deref(),
        }
    }

    /// Returns the delete rule for relationships.
    #[must_use]
    pub fn delete_rule(&self) -> Option<DeleteRule> {
        match self {
            PropertyDescriptor::Scalar => None,
            PropertyDescriptor::ToOne { delete_rule, .. }
            | PropertyDescriptor::ToMany { delete_rule, .. } => Some(*delete_rule),
        }
    }
}

/// Mapped metadata for one entity type.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    properties: HashMap<String, PropertyDescriptor>,
}

impl EntitySchema {
    /// Returns the entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a property descriptor.
    pub fn property(&self, name: &str) -> ModelResult<&PropertyDescriptor> {
        self.properties
            .get(name)
            .ok_or_else(|| ModelError::unknown_property(&self.name, name))
    }

    /// Returns true if the property is mapped on this entity.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Iterates relationship properties of this entity.
    pub fn relationships(&self) -> impl Iterator<Item = (&str, &PropertyDescriptor)> {
        self.properties
            .iter()
            .filter(|(_, d)| d.is_relationship())
            .map(|(n, d)| (n.as_str(), d))
    }
}

/// An immutable collection of entity schemas.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: HashMap<String, EntitySchema>,
}

impl Schema {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Looks up an entity schema.
    pub fn entity(&self, name: &str) -> ModelResult<&EntitySchema> {
        self.entities
            .get(name)
            .ok_or_else(|| ModelError::unknown_entity(name))
    }

    /// Looks up a property descriptor on an entity.
    pub fn property(&self, entity: &str, property: &str) -> ModelResult<&PropertyDescriptor> {
        self.entity(entity)?.property(property)
    }

    /// Returns true if the entity is mapped.
    #[must_use]
    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entities: HashMap<String, EntitySchema>,
}

impl SchemaBuilder {
    /// Adds an entity and configures its properties.
    #[must_use]
    pub fn entity(mut self, name: impl Into<String>, build: impl FnOnce(EntityBuilder) -> EntityBuilder) -> Self {
        let name = name.into();
        let entity = build(EntityBuilder {
            name: name.clone(),
            properties: HashMap::new(),
        });
        self.entities.insert(
            name,
            EntitySchema {
                name: entity.name,
                properties: entity.properties,
            },
        );
        self
    }

    /// Finishes the schema.
    #[must_use]
    pub fn build(self) -> Schema {
        Schema {
            entities: self.entities,
        }
    }
}

/// Builder for one entity's properties.
#[derive(Debug)]
pub struct EntityBuilder {
    name: String,
    properties: HashMap<String, PropertyDescriptor>,
}

impl EntityBuilder {
    /// Adds a scalar attribute.
    #[must_use]
    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.properties
            .insert(name.into(), PropertyDescriptor::Scalar);
        self
    }

    /// Adds a to-one relationship.
    #[must_use]
    pub fn to_one(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        reverse: Option<&str>,
        delete_rule: DeleteRule,
    ) -> Self {
        self.properties.insert(
            name.into(),
            PropertyDescriptor::ToOne {
                target: target.into(),
                reverse: reverse.map(str::to_owned),
                delete_rule,
            },
        );
        self
    }

    /// Adds a to-many relationship.
    #[must_use]
    pub fn to_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        reverse: Option<&str>,
        delete_rule: DeleteRule,
    ) -> Self {
        self.properties.insert(
            name.into(),
            PropertyDescriptor::ToMany {
                target: target.into(),
                reverse: reverse.map(str::to_owned),
                delete_rule,
            },
        );
        self
    }
}

//! # objgraph model
//!
//! Leaf data model for the objgraph change-tracking core.
//!
//! This crate provides:
//! - `Value` for scalar property and key values
//! - `Identity` for portable entity instance identifiers
//! - `PersistenceState` for per-node lifecycle state
//! - `Schema` metadata describing entities, properties and delete rules
//!
//! It has no knowledge of graphs, diffs or stores; those live in
//! `objgraph_core`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod identity;
mod schema;
mod state;
mod value;

pub use error::{ModelError, ModelResult};
pub use identity::Identity;
pub use schema::{DeleteRule, EntitySchema, PropertyDescriptor, Schema, SchemaBuilder};
pub use state::PersistenceState;
pub use value::Value;

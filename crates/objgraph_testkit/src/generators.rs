//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random graph data that maintains
//! required invariants.

use objgraph_model::{Identity, Value};
use proptest::prelude::*;

/// Strategy for generating valid entity names.
pub fn entity_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-zA-Z0-9]{0,15}").expect("Invalid regex")
}

/// Strategy for generating valid property names.
pub fn property_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating scalar values of every kind.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<f64>().prop_map(Value::Float),
        prop::string::string_regex("[ -~]{0,32}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ]
}

/// Strategy for generating temporary identities.
pub fn temporary_identity_strategy() -> impl Strategy<Value = Identity> {
    (entity_name_strategy(), prop::array::uniform8(any::<u8>()))
        .prop_map(|(entity, key)| Identity::temporary_with_key(entity, key))
}

/// Strategy for generating single-key permanent identities.
pub fn permanent_identity_strategy() -> impl Strategy<Value = Identity> {
    (entity_name_strategy(), any::<i64>())
        .prop_map(|(entity, pk)| Identity::permanent(entity, "id", pk))
}

/// Strategy for generating identities of either kind.
pub fn identity_strategy() -> impl Strategy<Value = Identity> {
    prop_oneof![
        temporary_identity_strategy(),
        permanent_identity_strategy(),
    ]
}

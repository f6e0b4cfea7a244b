//! Portable identifiers for persistent entity instances.

use crate::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Key representation behind an [`Identity`].
///
/// Single-key ids avoid a map allocation; composite keys use a `BTreeMap`
/// so iteration order (and therefore hashing) is stable regardless of how
/// the key map was assembled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdKey {
    /// Pseudo-unique binary key for an uncommitted object.
    Temporary([u8; 8]),
    /// Permanent id with no key values (degenerate but allowed).
    Empty,
    /// Permanent id with a single key attribute.
    Single(String, Value),
    /// Permanent id with a composite key.
    Composite(BTreeMap<String, Value>),
}

struct Inner {
    entity: String,
    key: IdKey,
    /// Permanent key values accumulated for an object created with a
    /// temporary id. Shared across clones so the registry, the node and any
    /// in-flight diff all observe the same accumulation.
    replacement: Mutex<BTreeMap<String, Value>>,
}

/// A portable global identifier for a persistent entity instance.
///
/// An identity is either *temporary* (created client-side before the store
/// has assigned primary key values) or *permanent* (backed by one or more
/// key values). Equality and hashing consider only the entity name and the
/// key representation; the replacement map is invisible to both.
///
/// `Identity` is cheap to clone: clones share the underlying representation,
/// including the mutable replacement map.
#[derive(Clone)]
pub struct Identity {
    inner: Arc<Inner>,
}

impl Identity {
    fn with_key(entity: impl Into<String>, key: IdKey) -> Self {
        Self {
            inner: Arc::new(Inner {
                entity: entity.into(),
                key,
                replacement: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Creates a temporary identity with a generated pseudo-unique key.
    ///
    /// Uniqueness is practical, not cryptographic: the key is 8 random
    /// bytes, enough to make collisions within a process vanishingly
    /// unlikely.
    #[must_use]
    pub fn temporary(entity: impl Into<String>) -> Self {
        Self::with_key(entity, IdKey::Temporary(rand::random()))
    }

    /// Creates a temporary identity with a caller-supplied binary key.
    ///
    /// The caller is responsible for the key being globally unique.
    #[must_use]
    pub fn temporary_with_key(entity: impl Into<String>, key: [u8; 8]) -> Self {
        Self::with_key(entity, IdKey::Temporary(key))
    }

    /// Creates a permanent identity with a single key attribute.
    #[must_use]
    pub fn permanent(
        entity: impl Into<String>,
        key_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::with_key(entity, IdKey::Single(key_name.into(), value.into()))
    }

    /// Creates a permanent identity from a key map.
    ///
    /// An empty map produces an empty-key identity; a single entry is stored
    /// in the optimized single-key form; anything larger is copied into an
    /// owned map, so later mutation of the source cannot affect the id.
    #[must_use]
    pub fn from_map(
        entity: impl Into<String>,
        key_map: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let mut map: BTreeMap<String, Value> = key_map.into_iter().collect();
        let key = match map.len() {
            0 => IdKey::Empty,
            1 => {
                let (name, value) = map.pop_first().unwrap_or_default();
                IdKey::Single(name, value)
            }
            _ => IdKey::Composite(map),
        };
        Self::with_key(entity, key)
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.inner.entity
    }

    /// Returns true if this is a temporary (pre-insert) identity.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self.inner.key, IdKey::Temporary(_))
    }

    /// Returns the binary key of a temporary identity.
    #[must_use]
    pub fn temp_key(&self) -> Option<&[u8; 8]> {
        match &self.inner.key {
            IdKey::Temporary(key) => Some(key),
            _ => None,
        }
    }

    /// Returns a snapshot of the permanent key values.
    ///
    /// For a temporary id this is the replacement map accumulated so far
    /// (empty if none); for a permanent id it is the key map itself.
    #[must_use]
    pub fn id_snapshot(&self) -> BTreeMap<String, Value> {
        match &self.inner.key {
            IdKey::Temporary(_) => self.inner.replacement.lock().clone(),
            IdKey::Empty => BTreeMap::new(),
            IdKey::Single(name, value) => {
                let mut map = BTreeMap::new();
                map.insert(name.clone(), value.clone());
                map
            }
            IdKey::Composite(map) => map.clone(),
        }
    }

    /// Appends one key value to the replacement map.
    ///
    /// This allows a replacement id to be built incrementally as permanent
    /// key values become known, e.g. during multi-step key generation.
    pub fn push_replacement(&self, key_name: impl Into<String>, value: impl Into<Value>) {
        self.inner
            .replacement
            .lock()
            .insert(key_name.into(), value.into());
    }

    /// Returns true if a full or partial replacement id is attached.
    ///
    /// Cheaper than snapshotting the map just to test emptiness.
    #[must_use]
    pub fn has_replacement(&self) -> bool {
        !self.inner.replacement.lock().is_empty()
    }

    /// Snapshots the current replacement map into a new permanent identity.
    ///
    /// No validation is performed; an empty replacement map yields an
    /// empty-key identity.
    #[must_use]
    pub fn create_replacement(&self) -> Identity {
        Identity::from_map(self.inner.entity.clone(), self.inner.replacement.lock().clone())
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.inner.entity == other.inner.entity && self.inner.key == other.inner.key
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.entity.hash(state);
        self.inner.key.hash(state);
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.inner.entity)?;
        match &self.inner.key {
            IdKey::Temporary(key) => {
                write!(f, ", TEMP:")?;
                for byte in key {
                    write!(f, "{byte:02X}")?;
                }
            }
            IdKey::Empty => {}
            IdKey::Single(name, value) => write!(f, ", {name}={value}")?,
            IdKey::Composite(map) => {
                for (name, value) in map {
                    write!(f, ", {name}={value}")?;
                }
            }
        }
        write!(f, ">")
    }
}

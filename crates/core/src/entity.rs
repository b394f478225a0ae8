//! Entity trait: identity + continuity across state changes.
//!
//! Records compare by identity only. Two in-memory instances with the same id and
//! different field values are the *same* record; two new records (no id) are never
//! equal, not even to themselves. That last rule is why records implement
//! `PartialEq` but never `Eq`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DomainResult;
use crate::id::EntityId;

/// A persisted record type exposed as a REST resource.
pub trait Entity: Clone + core::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Singular name used in alerts and error payloads (e.g. `building`).
    const NAME: &'static str;

    /// Collection path segment (e.g. `buildings`).
    const COLLECTION: &'static str;

    /// Serialized field names kept by the mapping view.
    const MAPPING_FIELDS: &'static [&'static str];

    /// Serialized field names accepted by `sort=` (besides `id`).
    const SORTABLE_FIELDS: &'static [&'static str];

    /// Returns the identity, if the record has been persisted.
    fn id(&self) -> Option<EntityId>;

    /// Assigns the store-generated identity.
    fn assign_id(&mut self, id: EntityId);

    fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Field-level validation run before every write.
    fn validate(&self) -> DomainResult<()> {
        Ok(())
    }

    fn is_sortable(field: &str) -> bool {
        field == "id" || Self::SORTABLE_FIELDS.contains(&field)
    }
}

/// Identity comparison: both ids present and equal.
pub fn same_identity<E: Entity>(a: &E, b: &E) -> bool {
    match (a.id(), b.id()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Full value comparison (every serialized field, id included).
///
/// Use this when field contents matter; `==` on a record only compares identity.
pub fn same_content<E: Entity>(a: &E, b: &E) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// Implements identity-only `PartialEq` and `Hash` for a record type.
#[macro_export]
macro_rules! identity_equality {
    ($t:ty) => {
        impl PartialEq for $t {
            fn eq(&self, other: &Self) -> bool {
                $crate::same_identity(self, other)
            }
        }

        impl core::hash::Hash for $t {
            fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
                core::hash::Hash::hash(&$crate::Entity::id(self), state);
            }
        }
    };
}

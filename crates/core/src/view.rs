//! Output projections.
//!
//! A record is always serialized through [`render`] with an explicit [`View`]; the
//! mapping view keeps only the fields listed in [`Entity::MAPPING_FIELDS`].

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::entity::Entity;

/// Which projection of a record to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Every serialized field.
    #[default]
    Default,
    /// The reduced field set used by map displays.
    Mapping,
}

/// Serialize `entity` through `view`.
pub fn render<E: Entity>(entity: &E, view: View) -> Result<JsonValue, serde_json::Error> {
    let value = serde_json::to_value(entity)?;
    Ok(match (view, value) {
        (View::Mapping, JsonValue::Object(map)) => JsonValue::Object(
            map.into_iter()
                .filter(|(k, _)| E::MAPPING_FIELDS.contains(&k.as_str()))
                .collect(),
        ),
        (_, value) => value,
    })
}

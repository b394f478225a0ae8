use serde::{Deserialize, Serialize};

use campus_core::{DomainError, DomainResult, Entity, EntityId};

/// Kind of value a building reports for a data definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Number,
    Text,
    Boolean,
}

/// Declares a measurement a building exposes (e.g. "Temperature", unit "°C").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingDataDefinition {
    pub id: Option<EntityId>,
    #[serde(default)]
    pub label: String,
    pub unit: Option<String>,
    pub data_type: Option<DataType>,
    pub building_id: Option<EntityId>,
}

campus_core::identity_equality!(BuildingDataDefinition);

impl BuildingDataDefinition {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

impl Entity for BuildingDataDefinition {
    const NAME: &'static str = "buildingDataDefinition";
    const COLLECTION: &'static str = "building-data-definitions";
    const MAPPING_FIELDS: &'static [&'static str] = &["id", "label", "dataType"];
    const SORTABLE_FIELDS: &'static [&'static str] = &["label", "unit", "dataType", "buildingId"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn validate(&self) -> DomainResult<()> {
        if self.label.trim().is_empty() {
            return Err(DomainError::validation(
                Self::NAME,
                "labelrequired",
                "label cannot be empty",
            ));
        }
        Ok(())
    }
}

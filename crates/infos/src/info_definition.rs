use serde::{Deserialize, Serialize};

use campus_core::{Entity, EntityId};

/// A kind of information (e.g. "Opening hours").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoDefinition {
    pub id: Option<EntityId>,
    pub label: Option<String>,
}

campus_core::identity_equality!(InfoDefinition);

impl InfoDefinition {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: Some(label.into()),
        }
    }
}

impl Entity for InfoDefinition {
    const NAME: &'static str = "infoDefinition";
    const COLLECTION: &'static str = "info-definitions";
    const MAPPING_FIELDS: &'static [&'static str] = &["id", "label"];
    const SORTABLE_FIELDS: &'static [&'static str] = &["label"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

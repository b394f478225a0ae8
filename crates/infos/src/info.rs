use serde::{Deserialize, Serialize};

use campus_core::{Entity, EntityId};

/// One value of an [`InfoDefinition`](crate::InfoDefinition).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub id: Option<EntityId>,
    pub value: Option<String>,
    pub definition_id: Option<EntityId>,
}

campus_core::identity_equality!(Info);

impl Entity for Info {
    const NAME: &'static str = "info";
    const COLLECTION: &'static str = "infos";
    const MAPPING_FIELDS: &'static [&'static str] = &["id", "value"];
    const SORTABLE_FIELDS: &'static [&'static str] = &["value", "definitionId"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

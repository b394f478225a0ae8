use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use campus_core::{Entity, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Info,
    Error,
    Check,
}

/// A dated notice grouping a set of infos.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Option<EntityId>,
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    pub title: Option<String>,
    /// Ids of the related [`Info`](crate::Info) records.
    #[serde(default)]
    pub infos: Vec<EntityId>,
}

campus_core::identity_equality!(Notification);

impl Entity for Notification {
    const NAME: &'static str = "notification";
    const COLLECTION: &'static str = "notifications";
    const MAPPING_FIELDS: &'static [&'static str] = &["id", "type", "title"];
    const SORTABLE_FIELDS: &'static [&'static str] = &["date", "type", "title"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }
}

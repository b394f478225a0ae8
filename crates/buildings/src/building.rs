use serde::{Deserialize, Serialize};

use campus_core::{DomainError, DomainResult, Entity, EntityId};

/// A campus building.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Building {
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub floors: Option<i32>,
    /// Base64-encoded floor plan image.
    pub plan: Option<String>,
    pub plan_content_type: Option<String>,
}

campus_core::identity_equality!(Building);

impl Building {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn located_at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_plan(mut self, content_type: impl Into<String>, base64: impl Into<String>) -> Self {
        self.plan_content_type = Some(content_type.into());
        self.plan = Some(base64.into());
        self
    }
}

impl Entity for Building {
    const NAME: &'static str = "building";
    const COLLECTION: &'static str = "buildings";
    const MAPPING_FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "latitude",
        "longitude",
        "plan",
        "planContentType",
    ];
    const SORTABLE_FIELDS: &'static [&'static str] =
        &["name", "address", "latitude", "longitude", "floors"];

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn assign_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation(
                Self::NAME,
                "namerequired",
                "name cannot be empty",
            ));
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(DomainError::validation(
                    Self::NAME,
                    "badlatitude",
                    "latitude must be within [-90, 90]",
                ));
            }
        }
        if let Some(lon) = self.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(DomainError::validation(
                    Self::NAME,
                    "badlongitude",
                    "longitude must be within [-180, 180]",
                ));
            }
        }
        if self.floors.is_some_and(|f| f < 0) {
            return Err(DomainError::validation(
                Self::NAME,
                "badfloors",
                "floors cannot be negative",
            ));
        }
        if self.plan.is_some() && self.plan_content_type.is_none() {
            return Err(DomainError::validation(
                Self::NAME,
                "plancontenttype",
                "a plan requires planContentType",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::{render, View};
    use proptest::prelude::*;
    use serde_json::json;

    fn key_of(result: DomainResult<()>) -> Option<String> {
        match result {
            Err(DomainError::Validation { error_key, .. }) => Some(error_key),
            _ => None,
        }
    }

    #[test]
    fn valid_building_passes() {
        let b = Building::named("Hall A")
            .located_at(48.85, 2.35)
            .with_plan("image/png", "iVBORw0KGgo=");
        assert!(b.validate().is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        assert_eq!(key_of(Building::named("   ").validate()).as_deref(), Some("namerequired"));
    }

    #[test]
    fn plan_without_content_type_is_rejected() {
        let mut b = Building::named("Hall A");
        b.plan = Some("AAAA".into());
        assert_eq!(key_of(b.validate()).as_deref(), Some("plancontenttype"));
    }

    #[test]
    fn negative_floors_are_rejected() {
        let mut b = Building::named("Hall A");
        b.floors = Some(-1);
        assert_eq!(key_of(b.validate()).as_deref(), Some("badfloors"));
    }

    #[test]
    fn deserializes_camel_case_without_id() {
        let b: Building = serde_json::from_value(json!({
            "name": "Library",
            "planContentType": "image/png",
            "plan": "AAAA"
        }))
        .unwrap();
        assert!(b.is_new());
        assert_eq!(b.plan_content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn mapping_view_hides_descriptive_fields() {
        let mut b = Building::named("Library").located_at(1.0, 2.0);
        b.id = Some(EntityId::new(3));
        b.description = Some("Main library".into());
        b.address = Some("1 Campus Way".into());

        let v = render(&b, View::Mapping).unwrap();
        assert_eq!(v["name"], "Library");
        assert_eq!(v["latitude"], 1.0);
        assert!(v.get("description").is_none());
        assert!(v.get("address").is_none());

        let full = render(&b, View::Default).unwrap();
        assert_eq!(full["address"], "1 Campus Way");
    }

    proptest! {
        #[test]
        fn latitude_bounds(lat in -200.0f64..200.0) {
            let b = Building::named("X").located_at(lat, 0.0);
            let ok = (-90.0..=90.0).contains(&lat);
            prop_assert_eq!(b.validate().is_ok(), ok);
        }
    }
}

use axum::Router;

use crate::app::headers::HeaderUtil;
use crate::app::services::AppServices;

pub mod admin;
pub mod resource;
pub mod system;

/// Router for everything under `/api`.
pub fn router(services: &AppServices) -> Router {
    let headers = HeaderUtil::new(services.app_name.as_str());
    Router::new()
        .merge(resource::router(services.buildings.clone(), headers.clone()))
        .merge(resource::router(services.building_data_definitions.clone(), headers.clone()))
        .merge(resource::router(services.info_definitions.clone(), headers.clone()))
        .merge(resource::router(services.infos.clone(), headers.clone()))
        .merge(resource::router(services.notifications.clone(), headers))
        .nest("/admin", admin::router())
}

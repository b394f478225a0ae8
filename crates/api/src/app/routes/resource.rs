//! The REST surface shared by every record type.
//!
//! | method | path                          |
//! |--------|-------------------------------|
//! | POST   | `/{collection}`               |
//! | PUT    | `/{collection}`               |
//! | GET    | `/{collection}`               |
//! | GET    | `/{collection}/:id`           |
//! | GET    | `/{collection}/:id/mapping`   |
//! | DELETE | `/{collection}/:id`           |
//! | GET    | `/_search/{collection}`       |

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::debug;

use campus_core::{render, DomainError, Entity, EntityId, View};
use campus_infra::{EntityService, Saved, ServiceError};

use crate::app::dto::ListParams;
use crate::app::errors::{self, ApiError};
use crate::app::headers::{self, HeaderUtil};

type ApiResult = Result<Response, ApiError>;

/// Per-record-type handler state.
pub struct ResourceState<E: Entity> {
    service: EntityService<E>,
    headers: HeaderUtil,
}

impl<E: Entity> Clone for ResourceState<E> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            headers: self.headers.clone(),
        }
    }
}

impl<E: Entity> ResourceState<E> {
    fn fail(&self, error: impl Into<ServiceError>) -> ApiError {
        ApiError::new(&self.headers, E::NAME, error)
    }

    fn body(&self, body: Result<Json<E>, JsonRejection>) -> Result<E, ApiError> {
        body.map(|Json(record)| record)
            .map_err(|rejection| self.fail(DomainError::validation(E::NAME, "badrequest", rejection.body_text())))
    }

    fn id(&self, raw: &str) -> Result<EntityId, ApiError> {
        raw.parse::<EntityId>().map_err(|e| self.fail(e))
    }

    fn params(&self, pairs: Vec<(String, String)>) -> Result<ListParams, ApiError> {
        ListParams::from_pairs(E::NAME, pairs).map_err(|e| self.fail(e))
    }

    fn alert_param(record: &E) -> String {
        record.id().map(|id| id.to_string()).unwrap_or_default()
    }

    fn created(&self, record: E) -> Response {
        let mut headers = self.headers.created(E::NAME, Self::alert_param(&record));
        if let Some(id) = record.id() {
            let location = format!("/api/{}/{}", E::COLLECTION, id);
            if let Ok(value) = HeaderValue::from_str(&location) {
                headers.insert(header::LOCATION, value);
            }
        }
        (StatusCode::CREATED, headers, Json(record)).into_response()
    }

    fn updated(&self, record: E) -> Response {
        let headers = self.headers.updated(E::NAME, Self::alert_param(&record));
        (StatusCode::OK, headers, Json(record)).into_response()
    }
}

pub fn router<E: Entity>(service: EntityService<E>, headers: HeaderUtil) -> Router {
    let collection = format!("/{}", E::COLLECTION);
    Router::new()
        .route(&collection, get(list::<E>).post(create::<E>).put(update::<E>))
        .route(&format!("{collection}/:id"), get(get_one::<E>).delete(delete::<E>))
        .route(&format!("{collection}/:id/mapping"), get(get_mapping::<E>))
        .route(&format!("/_search{collection}"), get(search::<E>))
        .layer(Extension(ResourceState { service, headers }))
}

async fn create<E: Entity>(
    Extension(state): Extension<ResourceState<E>>,
    body: Result<Json<E>, JsonRejection>,
) -> ApiResult {
    let record = state.body(body)?;
    debug!("REST request to save {} : {:?}", E::NAME, record);
    let saved = state.service.create(record).await.map_err(|e| state.fail(e))?;
    Ok(state.created(saved))
}

async fn update<E: Entity>(
    Extension(state): Extension<ResourceState<E>>,
    body: Result<Json<E>, JsonRejection>,
) -> ApiResult {
    let record = state.body(body)?;
    debug!("REST request to update {} : {:?}", E::NAME, record);
    match state.service.update(record).await.map_err(|e| state.fail(e))? {
        Saved::Created(record) => Ok(state.created(record)),
        Saved::Updated(record) => Ok(state.updated(record)),
    }
}

async fn list<E: Entity>(
    Extension(state): Extension<ResourceState<E>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult {
    let params = state.params(pairs)?;
    debug!("REST request to get a page of {}", E::COLLECTION);
    let page = state.service.find_all(&params.page).await.map_err(|e| state.fail(e))?;
    let headers = headers::pagination(&format!("/api/{}", E::COLLECTION), None, &page);
    Ok((headers, Json(page.content)).into_response())
}

async fn get_one<E: Entity>(
    Extension(state): Extension<ResourceState<E>>,
    Path(raw): Path<String>,
) -> ApiResult {
    let id = state.id(&raw)?;
    debug!("REST request to get {} : {}", E::NAME, id);
    let record = state.service.find(id).await.map_err(|e| state.fail(e))?;
    let record = record.ok_or_else(|| state.fail(DomainError::NotFound))?;
    Ok(Json(record).into_response())
}

async fn get_mapping<E: Entity>(
    Extension(state): Extension<ResourceState<E>>,
    Path(raw): Path<String>,
) -> ApiResult {
    let id = state.id(&raw)?;
    debug!("REST request to get mapping of {} : {}", E::NAME, id);
    let record = state.service.find(id).await.map_err(|e| state.fail(e))?;
    let record = record.ok_or_else(|| state.fail(DomainError::NotFound))?;
    match render(&record, View::Mapping) {
        Ok(view) => Ok(Json(view).into_response()),
        Err(e) => {
            tracing::error!(entity = E::NAME, %id, error = %e, "mapping view failed");
            Ok(errors::internal_error())
        }
    }
}

async fn delete<E: Entity>(
    Extension(state): Extension<ResourceState<E>>,
    Path(raw): Path<String>,
) -> ApiResult {
    let id = state.id(&raw)?;
    debug!("REST request to delete {} : {}", E::NAME, id);
    state.service.delete(id).await.map_err(|e| state.fail(e))?;
    let headers: HeaderMap = state.headers.deleted(E::NAME, id);
    Ok((StatusCode::OK, headers).into_response())
}

async fn search<E: Entity>(
    Extension(state): Extension<ResourceState<E>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult {
    let params = state.params(pairs)?;
    let query = params.query.unwrap_or_default();
    debug!("REST request to search for a page of {} for query {}", E::COLLECTION, query);
    let page = state.service.search(&query, &params.page).await.map_err(|e| state.fail(e))?;
    let headers = headers::pagination(&format!("/api/_search/{}", E::COLLECTION), Some(&query), &page);
    Ok((headers, Json(page.content)).into_response())
}

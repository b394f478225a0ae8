use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use campus_core::DomainError;
use campus_infra::ServiceError;

use crate::app::headers::HeaderUtil;

const PROBLEM_JSON: &str = "application/problem+json";

/// A failed resource request, rendered once the record type and header prefix are known.
#[derive(Debug)]
pub struct ApiError {
    headers: HeaderUtil,
    entity: &'static str,
    error: ServiceError,
}

impl ApiError {
    pub fn new(headers: &HeaderUtil, entity: &'static str, error: impl Into<ServiceError>) -> Self {
        Self {
            headers: headers.clone(),
            entity,
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.error {
            ServiceError::Domain(DomainError::NotFound) => StatusCode::NOT_FOUND.into_response(),
            ServiceError::Domain(DomainError::Validation {
                entity_name,
                error_key,
                message,
            }) => bad_request(&self.headers, &entity_name, &error_key, &message),
            ServiceError::Domain(DomainError::InvalidId(reason)) => {
                bad_request(&self.headers, self.entity, "badid", &format!("Invalid identifier: {reason}"))
            }
            other => {
                tracing::error!(entity = self.entity, error = %other, "request failed");
                internal_error()
            }
        }
    }
}

/// 400 with a problem payload and `X-{app}-error` / `X-{app}-params` headers.
pub fn bad_request(headers: &HeaderUtil, entity: &str, error_key: &str, title: &str) -> Response {
    let body = json!({
        "type": "about:blank",
        "title": title,
        "status": StatusCode::BAD_REQUEST.as_u16(),
        "entityName": entity,
        "errorKey": error_key,
        "message": format!("error.{error_key}"),
        "params": entity,
    });
    problem(StatusCode::BAD_REQUEST, headers.failure(entity, error_key), body)
}

/// 500 that names no internals; the cause is logged by the caller.
pub fn internal_error() -> Response {
    let body = json!({
        "type": "about:blank",
        "title": "Internal Server Error",
        "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        "message": "error.http.500",
    });
    problem(StatusCode::INTERNAL_SERVER_ERROR, Default::default(), body)
}

fn problem(status: StatusCode, headers: axum::http::HeaderMap, body: serde_json::Value) -> Response {
    let mut response = (status, headers, axum::Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_JSON));
    response
}

/// Plain JSON error used by the admin endpoints.
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_infra::repository::RepositoryError;

    fn util() -> HeaderUtil {
        HeaderUtil::new("campusApp")
    }

    #[test]
    fn validation_is_a_problem_with_failure_headers() {
        let response = ApiError::new(&util(), "building", DomainError::id_exists("building")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
        assert_eq!(response.headers()["x-campusapp-error"], "error.idexists");
        assert_eq!(response.headers()["x-campusapp-params"], "building");
    }

    #[test]
    fn bad_identifier_is_attributed_to_the_route_entity() {
        let err = "abc".parse::<campus_core::EntityId>().unwrap_err();
        let response = ApiError::new(&util(), "info", err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["x-campusapp-error"], "error.badid");
        assert_eq!(response.headers()["x-campusapp-params"], "info");
    }

    #[test]
    fn not_found_has_no_problem_headers() {
        let response = ApiError::new(&util(), "info", DomainError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-campusapp-error").is_none());
    }

    #[test]
    fn storage_failures_are_opaque_500s() {
        let error = ServiceError::Repository(RepositoryError::Storage("connection refused".into()));
        let response = ApiError::new(&util(), "info", error).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);
    }
}

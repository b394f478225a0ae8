//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, search index, and index worker
//! - `routes/`: generic record routes plus admin and health
//! - `headers.rs`: alert and pagination headers
//! - `dto.rs`: query parameters and admin payloads
//! - `errors.rs`: error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use campus_infra::AppConfig;

pub mod dto;
pub mod errors;
pub mod headers;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);

    let api = routes::router(&services).layer(Extension(services));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
}

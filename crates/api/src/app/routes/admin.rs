//! Operator endpoints for the search-index sync queue.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use campus_infra::indexer::{IndexQueueError, TaskId};

use crate::app::dto::{DeadLetterQuery, IndexStatsResponse, ReindexResponse};
use crate::app::{errors, services::AppServices};

const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;
const MAX_DEAD_LETTER_LIMIT: usize = 500;

pub fn router() -> Router {
    Router::new()
        .route("/index-tasks/stats", get(index_stats))
        .route("/index-tasks/dead-letters", get(dead_letters))
        .route("/index-tasks/dead-letters/:task_id/retry", post(retry_dead_letter))
        .route("/reindex/:entities", post(reindex))
}

async fn index_stats(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.index_queue.stats() {
        Ok(queue) => Json(IndexStatsResponse {
            queue,
            worker: services.worker.stats().snapshot(),
        })
        .into_response(),
        Err(e) => queue_error(e),
    }
}

async fn dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<DeadLetterQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DEAD_LETTER_LIMIT)
        .clamp(1, MAX_DEAD_LETTER_LIMIT);
    match services.index_queue.store().list_dead_letters(limit) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => queue_error(e),
    }
}

async fn retry_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Path(task_id): Path<String>,
) -> Response {
    let task_id = match task_id.parse::<TaskId>() {
        Ok(id) => id,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_task_id", e.to_string()),
    };

    let queued = match services.index_queue.retry_dead_letter(task_id) {
        Ok(queued) => queued,
        Err(e) => return queue_error(e),
    };

    match services.index_queue.store().get(queued) {
        Ok(Some(task)) => Json(task).into_response(),
        // Already drained by the worker.
        Ok(None) => Json(serde_json::json!({ "id": queued, "status": "completed" })).into_response(),
        Err(e) => queue_error(e),
    }
}

async fn reindex(Extension(services): Extension<Arc<AppServices>>, Path(entities): Path<String>) -> Response {
    let Some(target) = services.reindexer(&entities) else {
        return errors::json_error(
            StatusCode::NOT_FOUND,
            "unknown_collection",
            format!("no record type is exposed as {entities}"),
        );
    };

    match target.reindex().await {
        Ok(enqueued) => (
            StatusCode::ACCEPTED,
            Json(ReindexResponse {
                entity: target.entity_name(),
                enqueued,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(collection = %entities, error = %e, "reindex failed");
            errors::internal_error()
        }
    }
}

fn queue_error(e: IndexQueueError) -> Response {
    match e {
        IndexQueueError::NotFound(_) => errors::json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
        IndexQueueError::AlreadyExists(_) => errors::json_error(StatusCode::CONFLICT, "conflict", e.to_string()),
        IndexQueueError::Storage(_) => {
            tracing::error!(error = %e, "index queue failure");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "index_queue", "index queue unavailable")
        }
    }
}

//! Elasticsearch-backed search repository over the REST API.

use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tracing::instrument;

use campus_core::{Direction, Entity, EntityId, Page, PageRequest};

use super::{check_sort, identity_of, SearchError, SearchRepository};

/// Index name for a record type: its lowercased singular name.
pub fn index_name<E: Entity>() -> String {
    E::NAME.to_lowercase()
}

/// Search repository for one record type, one index per type.
pub struct ElasticsearchRepository<E> {
    client: reqwest::Client,
    base_url: String,
    index: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ElasticsearchRepository<E> {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index_name::<E>(),
            _entity: PhantomData,
        }
    }

    fn doc_url(&self, id: EntityId) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, id)
    }
}

fn network(e: reqwest::Error) -> SearchError {
    SearchError::Backend(format!("network error: {e}"))
}

async fn backend_failure(resp: reqwest::Response) -> SearchError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    SearchError::Backend(format!("elasticsearch returned {status}: {body}"))
}

/// Request body for one search page.
pub(crate) fn search_body(query: &str, request: &PageRequest) -> JsonValue {
    let query = if query.trim().is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "query_string": { "query": query } })
    };

    let mut sort: Vec<JsonValue> = request
        .sort
        .iter()
        .map(|o| {
            let missing = match o.direction {
                Direction::Asc => "_last",
                Direction::Desc => "_first",
            };
            let mut clause = serde_json::Map::new();
            clause.insert(
                o.field.clone(),
                json!({ "order": o.direction.as_str(), "missing": missing, "unmapped_type": "keyword" }),
            );
            JsonValue::Object(clause)
        })
        .collect();
    if request.sort.is_empty() {
        sort.push(json!("_score"));
    }
    if !request.sort.iter().any(|o| o.field == "id") {
        sort.push(json!({ "id": { "order": "asc" } }));
    }

    json!({
        "query": query,
        "from": request.offset(),
        "size": request.size,
        "sort": sort,
        "track_total_hits": true,
    })
}

/// Pull `(documents, total)` out of a `_search` response.
pub(crate) fn parse_hits<E: Entity>(body: &JsonValue) -> Result<(Vec<E>, u64), SearchError> {
    let hits = body
        .get("hits")
        .ok_or_else(|| SearchError::Backend("search response without hits".into()))?;
    let total = hits
        .pointer("/total/value")
        .or_else(|| hits.get("total"))
        .and_then(JsonValue::as_u64)
        .unwrap_or(0);

    let mut docs = Vec::new();
    for hit in hits.get("hits").and_then(JsonValue::as_array).into_iter().flatten() {
        let source = hit
            .get("_source")
            .cloned()
            .ok_or_else(|| SearchError::Document("hit without _source".into()))?;
        docs.push(serde_json::from_value(source).map_err(|e| SearchError::Document(e.to_string()))?);
    }
    Ok((docs, total))
}

fn query_error_reason(body: &JsonValue) -> String {
    body.pointer("/error/root_cause/0/reason")
        .or_else(|| body.pointer("/error/reason"))
        .and_then(JsonValue::as_str)
        .unwrap_or("query rejected by search backend")
        .to_string()
}

#[async_trait]
impl<E: Entity> SearchRepository<E> for ElasticsearchRepository<E> {
    #[instrument(skip(self, entity), fields(index = %self.index))]
    async fn index(&self, entity: &E) -> Result<(), SearchError> {
        let id = identity_of(entity)?;
        let resp = self
            .client
            .put(self.doc_url(id))
            .query(&[("refresh", "true")])
            .json(entity)
            .send()
            .await
            .map_err(network)?;

        if !resp.status().is_success() {
            return Err(backend_failure(resp).await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(index = %self.index))]
    async fn delete(&self, id: EntityId) -> Result<(), SearchError> {
        let resp = self
            .client
            .delete(self.doc_url(id))
            .query(&[("refresh", "true")])
            .send()
            .await
            .map_err(network)?;

        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(backend_failure(resp).await)
    }

    #[instrument(skip(self, request), fields(index = %self.index))]
    async fn search(&self, query: &str, request: &PageRequest) -> Result<Page<E>, SearchError> {
        check_sort::<E>(request)?;
        let resp = self
            .client
            .post(format!("{}/{}/_search", self.base_url, self.index))
            .json(&search_body(query, request))
            .send()
            .await
            .map_err(network)?;

        match resp.status() {
            s if s.is_success() => {
                let body: JsonValue = resp.json().await.map_err(network)?;
                let (content, total) = parse_hits::<E>(&body)?;
                Ok(Page::new(content, total, request.clone()))
            }
            // Nothing indexed yet for this type.
            StatusCode::NOT_FOUND => Ok(Page::empty(request.clone())),
            StatusCode::BAD_REQUEST => {
                let body: JsonValue = resp.json().await.unwrap_or(JsonValue::Null);
                Err(SearchError::InvalidQuery(query_error_reason(&body)))
            }
            _ => Err(backend_failure(resp).await),
        }
    }
}

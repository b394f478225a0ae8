//! Search index: a denormalized, query-string searchable copy of each record type.

pub mod document;
pub mod elasticsearch;
pub mod in_memory;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;

use campus_core::{Entity, EntityId, Page, PageRequest};

pub use elasticsearch::ElasticsearchRepository;
pub use in_memory::InMemorySearchIndex;

/// Search-index failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("invalid search query: {0}")]
    InvalidQuery(String),
    #[error("unsupported sort field: {0}")]
    InvalidSort(String),
    #[error("document error: {0}")]
    Document(String),
    #[error("search backend error: {0}")]
    Backend(String),
}

/// Search repository for one record type.
///
/// `index` replaces the whole document for the record's identity. `delete` of an
/// absent document succeeds.
#[async_trait]
pub trait SearchRepository<E: Entity>: Send + Sync {
    async fn index(&self, entity: &E) -> Result<(), SearchError>;
    async fn delete(&self, id: EntityId) -> Result<(), SearchError>;
    async fn search(&self, query: &str, request: &PageRequest) -> Result<Page<E>, SearchError>;
}

#[async_trait]
impl<E, S> SearchRepository<E> for Arc<S>
where
    E: Entity,
    S: SearchRepository<E> + ?Sized,
{
    async fn index(&self, entity: &E) -> Result<(), SearchError> {
        (**self).index(entity).await
    }

    async fn delete(&self, id: EntityId) -> Result<(), SearchError> {
        (**self).delete(id).await
    }

    async fn search(&self, query: &str, request: &PageRequest) -> Result<Page<E>, SearchError> {
        (**self).search(query, request).await
    }
}

fn identity_of<E: Entity>(entity: &E) -> Result<EntityId, SearchError> {
    entity
        .id()
        .ok_or_else(|| SearchError::Document(format!("cannot index a {} without identity", E::NAME)))
}

fn check_sort<E: Entity>(request: &PageRequest) -> Result<(), SearchError> {
    match request.sort.iter().find(|o| !E::is_sortable(&o.field)) {
        Some(bad) => Err(SearchError::InvalidSort(bad.field.clone())),
        None => Ok(()),
    }
}

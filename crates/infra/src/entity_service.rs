//! Record service: the write and read paths shared by every REST resource.
//!
//! ```text
//! save request
//!   ↓
//! 1. Reject identities on create, run field validation
//!   ↓
//! 2. Persist to the primary store (source of truth, synchronous)
//!   ↓
//! 3. Enqueue an index task (the search index catches up in the background)
//! ```
//!
//! A request only succeeds once both the primary write and the index obligation are
//! recorded, so the index can lag but never silently diverge.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use campus_core::{DomainError, Entity, EntityId, Page, PageRequest, MAX_PAGE_SIZE};

use crate::indexer::{IndexOp, IndexQueue, IndexQueueError};
use crate::repository::{EntityRepository, RepositoryError};
use crate::search::{SearchError, SearchRepository};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Caused by the request itself (validation, bad sort/query, unknown id).
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("primary store: {0}")]
    Repository(RepositoryError),
    #[error("search index: {0}")]
    Search(SearchError),
    #[error("index queue: {0}")]
    Index(#[from] IndexQueueError),
}

impl ServiceError {
    fn repository<E: Entity>(e: RepositoryError) -> Self {
        match e {
            RepositoryError::InvalidSort(field) => bad_sort::<E>(&field),
            RepositoryError::IdentityConflict(id) => DomainError::validation(
                E::NAME,
                "idconflict",
                format!("Identity {id} is already used by another record type"),
            )
            .into(),
            RepositoryError::SequenceExhausted => DomainError::validation(
                E::NAME,
                "idexhausted",
                "No identities are left for new records",
            )
            .into(),
            other => Self::Repository(other),
        }
    }

    fn search<E: Entity>(e: SearchError) -> Self {
        match e {
            SearchError::InvalidSort(field) => bad_sort::<E>(&field),
            SearchError::InvalidQuery(reason) => {
                DomainError::validation(E::NAME, "badquery", format!("Invalid search query: {reason}")).into()
            }
            other => Self::Search(other),
        }
    }
}

fn bad_sort<E: Entity>(field: &str) -> ServiceError {
    DomainError::validation(E::NAME, "badsort", format!("Unsupported sort property: {field}")).into()
}

/// Result of an update: PUT without an identity falls back to create.
#[derive(Debug, Clone)]
pub enum Saved<E> {
    Created(E),
    Updated(E),
}

impl<E> Saved<E> {
    pub fn was_created(&self) -> bool {
        matches!(self, Saved::Created(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            Saved::Created(e) | Saved::Updated(e) => e,
        }
    }
}

/// CRUD + search over one record type, keeping the search index in step.
pub struct EntityService<E: Entity> {
    repository: Arc<dyn EntityRepository<E>>,
    search: Arc<dyn SearchRepository<E>>,
    queue: IndexQueue,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            search: self.search.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<E: Entity> EntityService<E> {
    pub fn new(
        repository: Arc<dyn EntityRepository<E>>,
        search: Arc<dyn SearchRepository<E>>,
        queue: IndexQueue,
    ) -> Self {
        Self {
            repository,
            search,
            queue,
        }
    }

    async fn persist(&self, record: E) -> Result<E, ServiceError> {
        record.validate()?;
        let saved = self.repository.save(record).await.map_err(ServiceError::repository::<E>)?;
        // `save` always hands back an identified record.
        if let Some(id) = saved.id() {
            self.queue.enqueue(E::NAME, id, IndexOp::Upsert)?;
        }
        Ok(saved)
    }

    /// Create a new record. Records that already carry an identity are rejected.
    pub async fn create(&self, record: E) -> Result<E, ServiceError> {
        debug!(entity = E::NAME, ?record, "Request to create");
        if !record.is_new() {
            return Err(DomainError::id_exists(E::NAME).into());
        }
        self.persist(record).await
    }

    /// Replace a record. Without an identity this is a create; an identity the store
    /// has never seen is stored under that identity.
    pub async fn update(&self, record: E) -> Result<Saved<E>, ServiceError> {
        debug!(entity = E::NAME, ?record, "Request to update");
        if record.is_new() {
            return self.persist(record).await.map(Saved::Created);
        }
        self.persist(record).await.map(Saved::Updated)
    }

    pub async fn find(&self, id: EntityId) -> Result<Option<E>, ServiceError> {
        debug!(entity = E::NAME, %id, "Request to get");
        self.repository.find_by_id(id).await.map_err(ServiceError::repository::<E>)
    }

    pub async fn find_all(&self, request: &PageRequest) -> Result<Page<E>, ServiceError> {
        debug!(entity = E::NAME, page = request.page, size = request.size, "Request to get a page");
        self.repository.find_all(request).await.map_err(ServiceError::repository::<E>)
    }

    /// Delete a record. Deleting an unknown identity succeeds.
    pub async fn delete(&self, id: EntityId) -> Result<(), ServiceError> {
        debug!(entity = E::NAME, %id, "Request to delete");
        let removed = self.repository.delete(id).await.map_err(ServiceError::repository::<E>)?;
        if !removed {
            debug!(entity = E::NAME, %id, "delete of unknown record");
        }
        // Queued either way so stale index entries get cleaned up too.
        self.queue.enqueue(E::NAME, id, IndexOp::Delete)?;
        Ok(())
    }

    /// Query-string search over the index. Results may lag recent writes.
    pub async fn search(&self, query: &str, request: &PageRequest) -> Result<Page<E>, ServiceError> {
        debug!(entity = E::NAME, query, "Request to search for a page");
        self.search.search(query, request).await.map_err(ServiceError::search::<E>)
    }

    /// Queue an index sync for every stored record. Returns how many were queued.
    pub async fn reindex(&self) -> Result<u64, ServiceError> {
        let mut request = PageRequest::new(Some(0), Some(MAX_PAGE_SIZE));
        let mut enqueued = 0u64;
        loop {
            let page = self.repository.find_all(&request).await.map_err(ServiceError::repository::<E>)?;
            for id in page.content.iter().filter_map(Entity::id) {
                self.queue.enqueue(E::NAME, id, IndexOp::Upsert)?;
                enqueued += 1;
            }
            if !page.has_next() {
                break;
            }
            request = request.at_page(request.page + 1);
        }
        info!(entity = E::NAME, enqueued, "reindex queued");
        Ok(enqueued)
    }
}

/// Type-erased reindex entry point, one per record type.
#[async_trait]
pub trait Reindex: Send + Sync {
    fn entity_name(&self) -> &'static str;
    fn collection(&self) -> &'static str;
    async fn reindex(&self) -> Result<u64, ServiceError>;
}

#[async_trait]
impl<E: Entity> Reindex for EntityService<E> {
    fn entity_name(&self) -> &'static str {
        E::NAME
    }

    fn collection(&self) -> &'static str {
        E::COLLECTION
    }

    async fn reindex(&self) -> Result<u64, ServiceError> {
        EntityService::reindex(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{InMemoryIndexTaskStore, IndexWorker, IndexWorkerConfig, RetryPolicy};
    use crate::repository::InMemoryEntityRepository;
    use crate::search::InMemorySearchIndex;
    use campus_buildings::Building;
    use campus_core::SortOrder;

    struct Fixture {
        service: EntityService<Building>,
        worker: IndexWorker,
        index: Arc<InMemorySearchIndex<Building>>,
        queue: IndexQueue,
    }

    fn fixture() -> Fixture {
        let repo: Arc<InMemoryEntityRepository<Building>> = Arc::new(InMemoryEntityRepository::new());
        let index = Arc::new(InMemorySearchIndex::<Building>::new());
        let queue = IndexQueue::new(InMemoryIndexTaskStore::arc(), RetryPolicy::default());
        let mut worker = IndexWorker::new(&queue, IndexWorkerConfig::default());
        worker.register::<Building>(repo.clone(), index.clone());
        Fixture {
            service: EntityService::new(repo, index.clone(), queue.clone()),
            worker,
            index,
            queue,
        }
    }

    fn key_of(err: ServiceError) -> String {
        match err {
            ServiceError::Domain(d) => d.error_key().unwrap_or_default().to_string(),
            other => panic!("expected a domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_persists_then_indexes_in_the_background() {
        let f = fixture();
        let created = f.service.create(Building::named("Main Hall")).await.unwrap();
        let id = created.id.unwrap();

        assert!(f.service.find(id).await.unwrap().is_some());
        assert!(f.index.get(id).is_none());
        assert_eq!(f.queue.stats().unwrap().pending, 1);

        f.worker.run_until_idle().await.unwrap();
        let hits = f.service.search("hall", &PageRequest::default()).await.unwrap();
        assert_eq!(hits.content[0].id, Some(id));
    }

    #[tokio::test]
    async fn create_rejects_identity_and_invalid_fields() {
        let f = fixture();
        let mut with_id = Building::named("x");
        with_id.id = Some(EntityId::new(5));
        assert_eq!(key_of(f.service.create(with_id).await.unwrap_err()), "idexists");

        assert_eq!(key_of(f.service.create(Building::named("")).await.unwrap_err()), "namerequired");
        assert_eq!(f.service.find_all(&PageRequest::default()).await.unwrap().total, 0);
        assert_eq!(f.queue.stats().unwrap().pending, 0);
    }

    #[tokio::test]
    async fn update_without_identity_creates() {
        let f = fixture();
        let saved = f.service.update(Building::named("New")).await.unwrap();
        assert!(saved.was_created());

        let mut existing = saved.into_inner();
        existing.name = "Renamed".into();
        let saved = f.service.update(existing).await.unwrap();
        assert!(!saved.was_created());
        assert_eq!(saved.into_inner().name, "Renamed");
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_clears_the_index() {
        let f = fixture();
        let id = f.service.create(Building::named("Gone")).await.unwrap().id.unwrap();
        f.worker.run_until_idle().await.unwrap();
        assert!(f.index.get(id).is_some());

        f.service.delete(id).await.unwrap();
        f.service.delete(id).await.unwrap();
        f.worker.run_until_idle().await.unwrap();

        assert!(f.service.find(id).await.unwrap().is_none());
        assert!(f.index.get(id).is_none());
    }

    #[tokio::test]
    async fn bad_sort_and_query_are_client_errors() {
        let f = fixture();
        let request = PageRequest::default().with_sort(SortOrder::asc("secret"));
        assert_eq!(key_of(f.service.find_all(&request).await.unwrap_err()), "badsort");
        assert_eq!(key_of(f.service.search("*", &request).await.unwrap_err()), "badsort");
        assert_eq!(
            key_of(f.service.search("name:(", &PageRequest::default()).await.unwrap_err()),
            "badquery"
        );
    }

    #[tokio::test]
    async fn reindex_queues_every_record() {
        let f = fixture();
        for name in ["A", "B", "C"] {
            f.service.create(Building::named(name)).await.unwrap();
        }
        f.worker.run_until_idle().await.unwrap();

        assert_eq!(f.service.reindex().await.unwrap(), 3);
        let erased: &dyn Reindex = &f.service;
        assert_eq!(erased.entity_name(), "building");
        assert_eq!(erased.collection(), "buildings");
        assert_eq!(f.worker.run_until_idle().await.unwrap(), 3);
        assert_eq!(f.index.len(), 3);
    }
}

//! Primary store: durable CRUD + page queries over records, keyed by identity.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use campus_core::{Entity, EntityId, Page, PageRequest};

pub use in_memory::InMemoryEntityRepository;
pub use postgres::PostgresEntityRepository;

/// Primary-store failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("unsupported sort field: {0}")]
    InvalidSort(String),
    #[error("identity {0} already belongs to another record type")]
    IdentityConflict(EntityId),
    #[error("no identities left for new records")]
    SequenceExhausted,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence repository for one record type.
///
/// `save` assigns an identity to new records and overwrites existing ones
/// (last write wins). `delete` reports whether a record was removed; deleting an
/// unknown id is not an error.
#[async_trait]
pub trait EntityRepository<E: Entity>: Send + Sync {
    async fn save(&self, entity: E) -> Result<E, RepositoryError>;
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, RepositoryError>;
    async fn find_all(&self, request: &PageRequest) -> Result<Page<E>, RepositoryError>;
    async fn delete(&self, id: EntityId) -> Result<bool, RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
impl<E, S> EntityRepository<E> for Arc<S>
where
    E: Entity,
    S: EntityRepository<E> + ?Sized,
{
    async fn save(&self, entity: E) -> Result<E, RepositoryError> {
        (**self).save(entity).await
    }

    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn find_all(&self, request: &PageRequest) -> Result<Page<E>, RepositoryError> {
        (**self).find_all(request).await
    }

    async fn delete(&self, id: EntityId) -> Result<bool, RepositoryError> {
        (**self).delete(id).await
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        (**self).count().await
    }
}

/// Reject sort fields the record type does not expose.
pub(crate) fn check_sort<E: Entity>(request: &PageRequest) -> Result<(), RepositoryError> {
    match request.sort.iter().find(|o| !E::is_sortable(&o.field)) {
        Some(bad) => Err(RepositoryError::InvalidSort(bad.field.clone())),
        None => Ok(()),
    }
}

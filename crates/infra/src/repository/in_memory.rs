use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use campus_core::{sort_records, Entity, EntityId, Page, PageRequest};

use super::{check_sort, EntityRepository, RepositoryError};

/// In-memory primary store for tests/dev.
///
/// Identities come from a per-store sequence starting at 1. Saving a record with an
/// explicit id advances the sequence past it so later generated ids never collide.
/// Once the sequence reaches `i64::MAX`, creating a record fails with
/// [`RepositoryError::SequenceExhausted`] instead of reusing an identity.
#[derive(Debug)]
pub struct InMemoryEntityRepository<E> {
    inner: RwLock<BTreeMap<EntityId, E>>,
    sequence: AtomicI64,
    _entity: PhantomData<fn() -> E>,
}

impl<E> InMemoryEntityRepository<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            sequence: AtomicI64::new(1),
            _entity: PhantomData,
        }
    }
}

impl<E> Default for InMemoryEntityRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Storage("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl<E: Entity> EntityRepository<E> for InMemoryEntityRepository<E> {
    async fn save(&self, mut entity: E) -> Result<E, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let id = match entity.id() {
            Some(id) => {
                // Past i64::MAX the sequence parks on MAX, which is never handed out.
                let next = id.get().checked_add(1).unwrap_or(i64::MAX);
                self.sequence.fetch_max(next, Ordering::SeqCst);
                id
            }
            None => {
                let id = self
                    .sequence
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
                    .map(EntityId::new)
                    .map_err(|_| RepositoryError::SequenceExhausted)?;
                if map.contains_key(&id) {
                    return Err(RepositoryError::IdentityConflict(id));
                }
                entity.assign_id(id);
                id
            }
        };

        map.insert(id, entity.clone());
        Ok(entity)
    }

    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }

    async fn find_all(&self, request: &PageRequest) -> Result<Page<E>, RepositoryError> {
        check_sort::<E>(request)?;
        let all: Vec<E> = {
            let map = self.inner.read().map_err(|_| poisoned())?;
            map.values().cloned().collect()
        };
        let ordered = if request.sort.is_empty() {
            all
        } else {
            sort_records(all, &request.sort)
        };
        Ok(Page::from_ordered(ordered, request.clone()))
    }

    async fn delete(&self, id: EntityId) -> Result<bool, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.remove(&id).is_some())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.len() as u64)
    }
}

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use campus_core::{sort_records, Entity, EntityId, Page, PageRequest};

use super::document::IndexedDocument;
use super::query;
use super::{check_sort, identity_of, SearchError, SearchRepository};

/// In-memory search index for tests/dev.
///
/// Results are ordered by relevance, then identity, unless the request carries an
/// explicit sort.
#[derive(Debug)]
pub struct InMemorySearchIndex<E> {
    docs: RwLock<BTreeMap<EntityId, (E, IndexedDocument)>>,
}

impl<E> InMemorySearchIndex<E> {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<E> Default for InMemorySearchIndex<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> SearchError {
    SearchError::Backend("in-memory index lock poisoned".to_string())
}

impl<E: Entity> InMemorySearchIndex<E> {
    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed copy of one record, if present.
    pub fn get(&self, id: EntityId) -> Option<E> {
        self.docs.read().ok()?.get(&id).map(|(e, _)| e.clone())
    }
}

#[async_trait]
impl<E: Entity> SearchRepository<E> for InMemorySearchIndex<E> {
    async fn index(&self, entity: &E) -> Result<(), SearchError> {
        let id = identity_of(entity)?;
        let json = serde_json::to_value(entity).map_err(|e| SearchError::Document(e.to_string()))?;
        let analyzed = IndexedDocument::from_json(&json);

        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        docs.insert(id, (entity.clone(), analyzed));
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<(), SearchError> {
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        docs.remove(&id);
        Ok(())
    }

    async fn search(&self, raw: &str, request: &PageRequest) -> Result<Page<E>, SearchError> {
        check_sort::<E>(request)?;
        let query = query::parse(raw).map_err(|e| SearchError::InvalidQuery(e.to_string()))?;

        let mut hits: Vec<(u32, E)> = {
            let docs = self.docs.read().map_err(|_| poisoned())?;
            docs.values()
                .filter_map(|(entity, analyzed)| query.score(analyzed).map(|s| (s, entity.clone())))
                .collect()
        };

        let ordered: Vec<E> = if request.sort.is_empty() {
            // BTreeMap iteration already yields ascending identity; the sort is stable.
            hits.sort_by(|a, b| b.0.cmp(&a.0));
            hits.into_iter().map(|(_, e)| e).collect()
        } else {
            sort_records(hits.into_iter().map(|(_, e)| e).collect(), &request.sort)
        };
        Ok(Page::from_ordered(ordered, request.clone()))
    }
}

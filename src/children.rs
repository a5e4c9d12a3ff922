use std::sync::Arc;

use crate::{
    cache::{ChildIdCache, cache_key},
    compactor::TreeCompactor,
    error::StoreError,
    models::Category,
    repository::RepositoryState,
    sort::{SortDirection, SortSpec},
};

/// SortedChildren
///
/// Result of `SortedChildCache::get_sorted_children`. `records` is only filled when the
/// lookup had to read full records to sort them; it is then aligned with `ids`.
#[derive(Debug, Clone)]
pub struct SortedChildren {
    pub ids: Arc<Vec<i64>>,
    pub records: Option<Vec<Category>>,
}

/// SortedChildCache
///
/// Memoizes the compacted, sorted child ids of each parent per sort spec. A repeated lookup
/// for the same parent and sort returns the stored sequence without touching the store.
pub struct SortedChildCache {
    compactor: TreeCompactor,
    store: RepositoryState,
    cache: Arc<dyn ChildIdCache>,
}

impl SortedChildCache {
    pub fn new(compactor: TreeCompactor, store: RepositoryState, cache: Arc<dyn ChildIdCache>) -> Self {
        Self {
            compactor,
            store,
            cache,
        }
    }

    pub fn compactor(&self) -> &TreeCompactor {
        &self.compactor
    }

    pub fn store(&self) -> &RepositoryState {
        &self.store
    }

    pub async fn get_sorted_children(
        &self,
        parent: i64,
        sort: &SortSpec,
    ) -> Result<SortedChildren, StoreError> {
        let key = cache_key(parent, sort);
        if let Some(ids) = self.cache.get(&key) {
            tracing::debug!(%key, "child cache hit");
            return Ok(SortedChildren { ids, records: None });
        }
        tracing::debug!(%key, "child cache miss");

        let mut ids = self.compactor.compact(parent).await?;
        let records = match sort.natural_direction() {
            // Natural order already is sortorder ascending; no record read needed.
            Some(direction) => {
                if direction == SortDirection::Desc {
                    ids.reverse();
                }
                None
            }
            None if ids.is_empty() => None,
            None => {
                let mut records: Vec<Category> = self
                    .store
                    .records_by_ids(&ids)
                    .await?
                    .into_values()
                    .collect();
                sort.sort(&mut records);
                ids = records.iter().map(|c| c.id).collect();
                Some(records)
            }
        };

        let ids = Arc::new(ids);
        self.cache.set(key, Arc::clone(&ids));
        Ok(SortedChildren { ids, records })
    }
}

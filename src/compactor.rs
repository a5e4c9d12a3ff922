use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{error::StoreError, repository::RepositoryState, visibility::VisibilitySet};

type CompactFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<i64>, StoreError>> + Send + 'a>>;

/// TreeCompactor
///
/// Computes the effectively visible children of a category: its raw children in natural
/// order, where every hidden child is replaced in place by the effectively visible children
/// of that hidden child. Hidden leaves contribute nothing.
///
/// Each hidden node costs exactly one extra `child_ids` read. The store's parent relation
/// must be acyclic; a cycle through hidden categories would recurse forever.
pub struct TreeCompactor {
    store: RepositoryState,
    visibility: Arc<VisibilitySet>,
}

impl TreeCompactor {
    pub fn new(store: RepositoryState, visibility: Arc<VisibilitySet>) -> Self {
        Self { store, visibility }
    }

    pub fn visibility(&self) -> &VisibilitySet {
        &self.visibility
    }

    /// Ids only, no sorting beyond the store's natural order.
    pub fn compact(&self, parent: i64) -> CompactFuture<'_> {
        Box::pin(async move {
            let raw = self.store.child_ids(parent).await?;
            let mut visible = Vec::with_capacity(raw.len());
            for id in raw {
                if self.visibility.is_hidden(id) {
                    // Each recursive call returns a self-contained sequence; append it.
                    let promoted = self.compact(id).await?;
                    visible.extend(promoted);
                } else {
                    visible.push(id);
                }
            }
            tracing::trace!(parent, count = visible.len(), "compacted children");
            Ok(visible)
        })
    }
}

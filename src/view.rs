use std::collections::HashSet;
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;

use crate::{
    cache::ChildIdCache,
    children::SortedChildCache,
    compactor::TreeCompactor,
    error::CategoryError,
    models::{Category, CategoryListing, CategoryPage, CategoryTreeNode, ListingItem, TOP_CATEGORY_ID},
    repository::RepositoryState,
    sort::SortSpec,
    visibility::{RequestContext, VisibilitySet},
};

/// ChildrenOptions
///
/// Sort and pagination of a child listing. A `limit` of `None` or 0 means unbounded.
#[derive(Debug, Clone, Default)]
pub struct ChildrenOptions {
    pub sort: SortSpec,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ChildrenOptions {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Clamps `offset`/`limit` to a sequence of `len` items. Out of range gives an empty range.
pub fn page_bounds(len: usize, offset: usize, limit: Option<usize>) -> Range<usize> {
    let start = offset.min(len);
    let end = match limit.filter(|limit| *limit > 0) {
        Some(limit) => start.saturating_add(limit).min(len),
        None => len,
    };
    start..end
}

type TreeFuture<'a> = Pin<Box<dyn Future<Output = Result<CategoryTreeNode, CategoryError>> + Send + 'a>>;

/// CategoryView
///
/// Visibility-aware read model used by the browse, tree and management endpoints. Every
/// child list it hands out is compacted: hidden categories are absent and their visible
/// descendants take their place.
pub struct CategoryView {
    children: SortedChildCache,
}

impl CategoryView {
    pub fn new(
        store: RepositoryState,
        visibility: Arc<VisibilitySet>,
        cache: Arc<dyn ChildIdCache>,
    ) -> Self {
        let compactor = TreeCompactor::new(store.clone(), visibility);
        Self {
            children: SortedChildCache::new(compactor, store, cache),
        }
    }

    /// Builds the view for one request, computing the request's visibility partition if
    /// nothing has needed it yet.
    pub async fn for_request(
        context: &RequestContext,
        store: RepositoryState,
        cache: Arc<dyn ChildIdCache>,
    ) -> Result<Self, CategoryError> {
        let visibility = context.visibility().await?;
        Ok(Self::new(store, visibility, cache))
    }

    fn visibility(&self) -> &VisibilitySet {
        self.children.compactor().visibility()
    }

    /// Resolves a category id. Id 0 is the synthetic top category. Hidden categories are
    /// reported as missing.
    pub async fn category(&self, id: i64) -> Result<Category, CategoryError> {
        if id == TOP_CATEGORY_ID {
            return Ok(Category::top());
        }
        if self.visibility().is_hidden(id) {
            return Err(CategoryError::NotFound(id));
        }
        self.children
            .store()
            .records_by_ids(&[id])
            .await?
            .remove(&id)
            .ok_or(CategoryError::NotFound(id))
    }

    /// One page of the effectively visible children of `category`, in sort order.
    pub async fn children_of(
        &self,
        category: &Category,
        options: &ChildrenOptions,
    ) -> Result<Vec<Category>, CategoryError> {
        let sorted = self
            .children
            .get_sorted_children(category.id, &options.sort)
            .await?;
        let range = page_bounds(sorted.ids.len(), options.offset, options.limit);
        if range.is_empty() {
            return Ok(vec![]);
        }

        if let Some(mut records) = sorted.records {
            // Sorting already read every record; reuse them.
            records.truncate(range.end);
            return Ok(records.split_off(range.start));
        }

        let page = &sorted.ids[range];
        let mut records = self.children.store().records_by_ids(page).await?;
        Ok(page.iter().filter_map(|id| records.remove(id)).collect())
    }

    /// Number of effectively visible children; always equals the length of an unbounded
    /// `children_of`.
    pub async fn children_count(&self, category: &Category) -> Result<usize, CategoryError> {
        let sorted = self
            .children
            .get_sorted_children(category.id, &SortSpec::default())
            .await?;
        Ok(sorted.ids.len())
    }

    /// The landing category of the principal: the single visible top-level category when
    /// there is exactly one, the synthetic top otherwise (none, or two and more).
    pub async fn user_top_category(&self) -> Result<Category, CategoryError> {
        let top = Category::top();
        let mut children = self.children_of(&top, &ChildrenOptions::unbounded()).await?;
        if children.len() == 1 {
            if let Some(only) = children.pop() {
                return Ok(only);
            }
        }
        Ok(top)
    }

    /// Browse page: `category_id` (or the user's top category) with one page of children.
    pub async fn browse(
        &self,
        category_id: Option<i64>,
        sort: SortSpec,
        page: usize,
        per_page: usize,
    ) -> Result<CategoryPage, CategoryError> {
        let category = match category_id {
            Some(id) => self.category(id).await?,
            None => self.user_top_category().await?,
        };
        let per_page = per_page.max(1);
        let options = ChildrenOptions {
            sort,
            offset: page.saturating_mul(per_page),
            limit: Some(per_page),
        };
        let children = self.children_of(&category, &options).await?;
        let children_count = self.children_count(&category).await?;
        Ok(CategoryPage {
            category,
            children,
            children_count,
            page,
            per_page,
        })
    }

    /// Nested tree below `category`, `depth` levels deep, at most `limit` children per level.
    pub fn tree(&self, category: Category, depth: usize, limit: Option<usize>) -> TreeFuture<'_> {
        Box::pin(async move {
            let children_count = self.children_count(&category).await?;
            if depth == 0 || children_count == 0 {
                return Ok(CategoryTreeNode {
                    category,
                    children_count,
                    has_more: children_count > 0,
                    children: vec![],
                });
            }

            let options = ChildrenOptions {
                limit,
                ..ChildrenOptions::default()
            };
            let direct = self.children_of(&category, &options).await?;
            let has_more = direct.len() < children_count;
            let mut children = Vec::with_capacity(direct.len());
            for child in direct {
                children.push(self.tree(child, depth - 1, limit).await?);
            }
            Ok(CategoryTreeNode {
                category,
                children_count,
                has_more,
                children,
            })
        })
    }

    /// Management listing. Top-level rows are expanded when listed in `expanded` or when
    /// they head the selected category's visible ancestor chain.
    pub async fn listing(
        &self,
        selected: Option<&Category>,
        expanded: &[i64],
    ) -> Result<CategoryListing, CategoryError> {
        let top_level = self
            .children_of(&Category::top(), &ChildrenOptions::unbounded())
            .await?;

        let selected_parents: Vec<i64> = match selected {
            Some(category) if !category.is_top() => category
                .ancestor_ids()
                .into_iter()
                .filter(|id| !self.visibility().is_hidden(*id))
                .chain(std::iter::once(category.id))
                .collect(),
            _ => vec![],
        };

        let mut expand: HashSet<i64> = expanded.iter().copied().collect();
        if let Some(first) = selected_parents.first() {
            expand.insert(*first);
        }

        let mut items = Vec::with_capacity(top_level.len());
        for category in top_level {
            let subcategories = if expand.contains(&category.id) {
                self.children_of(&category, &ChildrenOptions::unbounded())
                    .await?
            } else {
                vec![]
            };
            let children_count = self.children_count(&category).await?;
            items.push(ListingItem {
                category,
                children_count,
                subcategories,
            });
        }

        Ok(CategoryListing {
            items,
            selected_category: selected.filter(|c| !c.is_top()).map(|c| c.id),
            selected_parents,
        })
    }

    /// Ancestor chain of `category` (root first) restricted to categories the principal
    /// can view.
    pub async fn breadcrumb(&self, category: &Category) -> Result<Vec<Category>, CategoryError> {
        let ancestors: Vec<i64> = category
            .ancestor_ids()
            .into_iter()
            .filter(|id| self.visibility().is_viewable(*id))
            .collect();
        if ancestors.is_empty() {
            return Ok(vec![]);
        }
        let mut records = self.children.store().records_by_ids(&ancestors).await?;
        Ok(ancestors
            .iter()
            .filter_map(|id| records.remove(id))
            .collect())
    }
}

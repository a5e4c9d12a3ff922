use crate::{
    error::StoreError,
    models::{Category, User},
};
use async_trait::async_trait;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// CategoryFilter
///
/// Field predicates of the category search API. Every populated field must match (AND).
/// `ids` holds one id list per `ids` criterion; a record must be in each of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryFilter {
    pub id: Option<i64>,
    pub ids: Vec<Vec<i64>>,
    pub name: Option<String>,
    pub parent: Option<i64>,
    pub idnumber: Option<String>,
    pub visible: Option<bool>,
    pub theme: Option<String>,
}

impl CategoryFilter {
    pub fn matches(&self, category: &Category) -> bool {
        self.id.is_none_or(|id| category.id == id)
            && self.ids.iter().all(|ids| ids.contains(&category.id))
            && self.name.as_ref().is_none_or(|name| &category.name == name)
            && self.parent.is_none_or(|parent| category.parent == parent)
            && self
                .idnumber
                .as_ref()
                .is_none_or(|idnumber| category.idnumber.as_ref() == Some(idnumber))
            && self.subtree().matches(category)
    }

    /// The part of the filter that also constrains sub categories.
    pub fn subtree(&self) -> SubtreeFilter {
        SubtreeFilter {
            visible: self.visible,
            theme: self.theme.clone(),
        }
    }
}

/// SubtreeFilter
///
/// Constraints carried over from the matched categories to their sub categories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtreeFilter {
    pub visible: Option<bool>,
    pub theme: Option<String>,
}

impl SubtreeFilter {
    pub fn matches(&self, category: &Category) -> bool {
        self.visible.is_none_or(|visible| category.visible == visible)
            && self
                .theme
                .as_ref()
                .is_none_or(|theme| category.theme.as_ref() == Some(theme))
    }
}

/// CategoryStore
///
/// Contract of the persistent category store. Queries that match nothing return empty
/// collections; failures are returned as `StoreError` and never retried here.
///
/// The parent relation is assumed to be acyclic. Tree walks built on `child_ids` do not
/// terminate on a cyclic store.
#[async_trait]
pub trait CategoryStore: Send + Sync {
    // Direct children of `parent`, in natural (sortorder ascending) order, unfiltered.
    async fn child_ids(&self, parent: i64) -> Result<Vec<i64>, StoreError>;
    // One batch read of full records.
    async fn records_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Category>, StoreError>;
    async fn records_by_filter(&self, filter: &CategoryFilter) -> Result<Vec<Category>, StoreError>;
    // Strict descendants of the category at `path`.
    async fn records_under_path(
        &self,
        path: &str,
        filter: &SubtreeFilter,
    ) -> Result<Vec<Category>, StoreError>;
    async fn all_records(&self) -> Result<Vec<Category>, StoreError>;

    // --- Authorization inputs ---
    async fn visibility_flags(&self) -> Result<Vec<(i64, bool)>, StoreError>;
    async fn context_denials(&self, user_id: Uuid) -> Result<HashSet<i64>, StoreError>;

    // --- User/Auth ---
    /// `Ok(None)` when no such user exists; a failed lookup is an error, not a missing user.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
}

/// RepositoryState
///
/// Shared handle on the store used by the application state.
pub type RepositoryState = Arc<dyn CategoryStore>;

const CATEGORY_COLUMNS: &str = "id, parent, path, depth, sortorder, name, idnumber, description, \
     descriptionformat, coursecount, visible, visibleold, timemodified, theme";

/// Logs a failed query and converts it for propagation.
fn store_failure(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        tracing::error!("{} error: {:?}", operation, e);
        StoreError::Database(e)
    }
}

/// PostgresRepository
///
/// `CategoryStore` backed by the `course_categories` table.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select() -> QueryBuilder<'static, sqlx::Postgres> {
        QueryBuilder::new(format!(
            "SELECT {} FROM course_categories WHERE 1 = 1",
            CATEGORY_COLUMNS
        ))
    }
}

#[async_trait]
impl CategoryStore for PostgresRepository {
    async fn child_ids(&self, parent: i64) -> Result<Vec<i64>, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM course_categories WHERE parent = $1 ORDER BY sortorder ASC",
        )
        .bind(parent)
        .fetch_all(&self.pool)
        .await
        .map_err(store_failure("child_ids"))
    }

    async fn records_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Category>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut builder = Self::select();
        builder.push(" AND id = ANY(");
        builder.push_bind(ids.to_vec());
        builder.push(")");

        let records = builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_failure("records_by_ids"))?;
        Ok(records.into_iter().map(|c| (c.id, c)).collect())
    }

    /// records_by_filter
    ///
    /// Builds the WHERE clause with bound parameters only, one clause per populated field.
    async fn records_by_filter(&self, filter: &CategoryFilter) -> Result<Vec<Category>, StoreError> {
        let mut builder = Self::select();

        if let Some(id) = filter.id {
            builder.push(" AND id = ");
            builder.push_bind(id);
        }
        for ids in &filter.ids {
            builder.push(" AND id = ANY(");
            builder.push_bind(ids.clone());
            builder.push(")");
        }
        if let Some(name) = &filter.name {
            builder.push(" AND name = ");
            builder.push_bind(name.clone());
        }
        if let Some(parent) = filter.parent {
            builder.push(" AND parent = ");
            builder.push_bind(parent);
        }
        if let Some(idnumber) = &filter.idnumber {
            builder.push(" AND idnumber = ");
            builder.push_bind(idnumber.clone());
        }
        if let Some(visible) = filter.visible {
            builder.push(" AND visible = ");
            builder.push_bind(visible);
        }
        if let Some(theme) = &filter.theme {
            builder.push(" AND theme = ");
            builder.push_bind(theme.clone());
        }
        builder.push(" ORDER BY path ASC");

        builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_failure("records_by_filter"))
    }

    async fn records_under_path(
        &self,
        path: &str,
        filter: &SubtreeFilter,
    ) -> Result<Vec<Category>, StoreError> {
        let mut builder = Self::select();
        builder.push(" AND path LIKE ");
        builder.push_bind(format!("{}/%", path));
        if let Some(visible) = filter.visible {
            builder.push(" AND visible = ");
            builder.push_bind(visible);
        }
        if let Some(theme) = &filter.theme {
            builder.push(" AND theme = ");
            builder.push_bind(theme.clone());
        }
        builder.push(" ORDER BY path ASC");

        builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_failure("records_under_path"))
    }

    async fn all_records(&self) -> Result<Vec<Category>, StoreError> {
        let mut builder = Self::select();
        builder.push(" ORDER BY path ASC");
        builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await
            .map_err(store_failure("all_records"))
    }

    async fn visibility_flags(&self) -> Result<Vec<(i64, bool)>, StoreError> {
        sqlx::query_as::<_, (i64, bool)>("SELECT id, visible FROM course_categories")
            .fetch_all(&self.pool)
            .await
            .map_err(store_failure("visibility_flags"))
    }

    async fn context_denials(&self, user_id: Uuid) -> Result<HashSet<i64>, StoreError> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT category_id FROM category_context_denials WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_failure("context_denials"))?;
        Ok(ids.into_iter().collect())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>("SELECT id, email, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_failure("get_user"))
    }
}

/// MemoryRepository
///
/// In-memory `CategoryStore`. Counts every category read so callers can observe memoization,
/// and can be switched into a failing mode to exercise error propagation.
#[derive(Default)]
pub struct MemoryRepository {
    categories: RwLock<BTreeMap<i64, Category>>,
    users: RwLock<HashMap<Uuid, User>>,
    denials: RwLock<HashMap<Uuid, HashSet<i64>>>,
    reads: AtomicUsize,
    should_fail: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let categories = categories.into_iter().map(|c| (c.id, c)).collect();
        Self {
            categories: RwLock::new(categories),
            ..Self::default()
        }
    }

    pub async fn insert_category(&self, category: Category) {
        self.categories.write().await.insert(category.id, category);
    }

    pub async fn insert_user(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    /// Makes the access context of `category_id` invalid for `user_id`.
    pub async fn deny_context(&self, user_id: Uuid, category_id: i64) {
        self.denials
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(category_id);
    }

    /// Number of category reads served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.should_fail.store(failing, Ordering::SeqCst);
    }

    fn available(&self) -> Result<(), StoreError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "Memory store: simulated outage".to_string(),
            ));
        }
        Ok(())
    }

    fn begin_read(&self) -> Result<(), StoreError> {
        self.available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CategoryStore for MemoryRepository {
    async fn child_ids(&self, parent: i64) -> Result<Vec<i64>, StoreError> {
        self.begin_read()?;
        let categories = self.categories.read().await;
        let mut children: Vec<&Category> =
            categories.values().filter(|c| c.parent == parent).collect();
        children.sort_by_key(|c| (c.sortorder, c.id));
        Ok(children.into_iter().map(|c| c.id).collect())
    }

    async fn records_by_ids(&self, ids: &[i64]) -> Result<HashMap<i64, Category>, StoreError> {
        self.begin_read()?;
        let categories = self.categories.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| categories.get(id).map(|c| (c.id, c.clone())))
            .collect())
    }

    async fn records_by_filter(&self, filter: &CategoryFilter) -> Result<Vec<Category>, StoreError> {
        self.begin_read()?;
        let categories = self.categories.read().await;
        Ok(categories
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn records_under_path(
        &self,
        path: &str,
        filter: &SubtreeFilter,
    ) -> Result<Vec<Category>, StoreError> {
        self.begin_read()?;
        let prefix = format!("{}/", path);
        let categories = self.categories.read().await;
        Ok(categories
            .values()
            .filter(|c| c.path.starts_with(&prefix) && filter.matches(c))
            .cloned()
            .collect())
    }

    async fn all_records(&self) -> Result<Vec<Category>, StoreError> {
        self.begin_read()?;
        Ok(self.categories.read().await.values().cloned().collect())
    }

    async fn visibility_flags(&self) -> Result<Vec<(i64, bool)>, StoreError> {
        self.begin_read()?;
        Ok(self
            .categories
            .read()
            .await
            .values()
            .map(|c| (c.id, c.visible))
            .collect())
    }

    async fn context_denials(&self, user_id: Uuid) -> Result<HashSet<i64>, StoreError> {
        self.begin_read()?;
        Ok(self
            .denials
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        // User lookups are not category reads.
        self.available()?;
        Ok(self.users.read().await.get(&id).cloned())
    }
}

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::{auth::AuthUser, error::StoreError, repository::RepositoryState};

/// VisibilitySet
///
/// Partition of every known category id into viewable and hidden for one principal.
/// Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilitySet {
    viewable: HashSet<i64>,
    hidden: HashSet<i64>,
}

impl VisibilitySet {
    /// `hidden = all - viewable`. Viewable ids unknown to `all` are kept as viewable.
    pub fn new(all: HashSet<i64>, viewable: HashSet<i64>) -> Self {
        let hidden = all.difference(&viewable).copied().collect();
        Self { viewable, hidden }
    }

    pub fn is_hidden(&self, id: i64) -> bool {
        self.hidden.contains(&id)
    }

    pub fn is_viewable(&self, id: i64) -> bool {
        self.viewable.contains(&id)
    }

    pub fn viewable(&self) -> &HashSet<i64> {
        &self.viewable
    }

    pub fn hidden(&self) -> &HashSet<i64> {
        &self.hidden
    }
}

/// ContextAccess
///
/// Outcome of validating a category's access context for a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextAccess {
    Granted,
    Denied(String),
}

/// VisibilityOracle
///
/// Authorization collaborator. Calls are idempotent within one request; `RequestContext`
/// makes sure each is issued at most once per request.
#[async_trait]
pub trait VisibilityOracle: Send + Sync {
    /// Every category the principal may view.
    async fn viewable_ids(&self, principal: &AuthUser) -> Result<HashSet<i64>, StoreError>;
    /// Every category, without the visibility filter.
    async fn all_ids(&self) -> Result<HashSet<i64>, StoreError>;
    /// Categories whose access context the principal cannot enter, with the cause.
    async fn denied_contexts(
        &self,
        principal: &AuthUser,
    ) -> Result<HashMap<i64, String>, StoreError>;
}

pub type OracleState = Arc<dyn VisibilityOracle>;

/// StoreVisibilityOracle
///
/// Answers from the category store: a category is viewable when its `visible` flag is set,
/// or for any principal holding the view-hidden capability.
pub struct StoreVisibilityOracle {
    store: RepositoryState,
}

impl StoreVisibilityOracle {
    pub fn new(store: RepositoryState) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VisibilityOracle for StoreVisibilityOracle {
    async fn viewable_ids(&self, principal: &AuthUser) -> Result<HashSet<i64>, StoreError> {
        let see_all = principal.capabilities().view_hidden;
        Ok(self
            .store
            .visibility_flags()
            .await?
            .into_iter()
            .filter(|(_, visible)| see_all || *visible)
            .map(|(id, _)| id)
            .collect())
    }

    async fn all_ids(&self) -> Result<HashSet<i64>, StoreError> {
        Ok(self
            .store
            .visibility_flags()
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    async fn denied_contexts(
        &self,
        principal: &AuthUser,
    ) -> Result<HashMap<i64, String>, StoreError> {
        Ok(self
            .store
            .context_denials(principal.id)
            .await?
            .into_iter()
            .map(|id| (id, format!("access to category context {} denied", id)))
            .collect())
    }
}

/// RequestContext
///
/// Per-request state: the principal plus lazily computed, write-once authorization data.
/// The visibility partition is computed on first use and never recomputed or mutated for
/// the rest of the request.
pub struct RequestContext {
    principal: AuthUser,
    oracle: OracleState,
    visibility: OnceCell<Arc<VisibilitySet>>,
    denials: OnceCell<Arc<HashMap<i64, String>>>,
}

impl RequestContext {
    pub fn new(principal: AuthUser, oracle: OracleState) -> Self {
        Self {
            principal,
            oracle,
            visibility: OnceCell::new(),
            denials: OnceCell::new(),
        }
    }

    pub fn principal(&self) -> &AuthUser {
        &self.principal
    }

    pub async fn visibility(&self) -> Result<Arc<VisibilitySet>, StoreError> {
        self.visibility
            .get_or_try_init(|| async {
                let all = self.oracle.all_ids().await?;
                let viewable = self.oracle.viewable_ids(&self.principal).await?;
                let set = VisibilitySet::new(all, viewable);
                tracing::debug!(
                    user = %self.principal.id,
                    viewable = set.viewable().len(),
                    hidden = set.hidden().len(),
                    "visibility partition computed"
                );
                Ok::<_, StoreError>(Arc::new(set))
            })
            .await
            .cloned()
    }

    pub async fn validate_context(&self, category_id: i64) -> Result<ContextAccess, StoreError> {
        let denials = self
            .denials
            .get_or_try_init(|| async {
                let denials = self.oracle.denied_contexts(&self.principal).await?;
                Ok::<_, StoreError>(Arc::new(denials))
            })
            .await?;
        Ok(match denials.get(&category_id) {
            Some(cause) => ContextAccess::Denied(cause.clone()),
            None => ContextAccess::Granted,
        })
    }
}

#![allow(dead_code)]

use category_visibility::{
    auth::AuthUser,
    cache::MemoryChildCache,
    models::{Category, User, join_path},
    repository::{MemoryRepository, RepositoryState},
    view::CategoryView,
    visibility::{OracleState, RequestContext, StoreVisibilityOracle, VisibilitySet},
};
use std::sync::Arc;
use uuid::Uuid;

pub const USER_ID: Uuid = Uuid::from_u128(123);
pub const MANAGER_ID: Uuid = Uuid::from_u128(456);
pub const AUDITOR_ID: Uuid = Uuid::from_u128(789);

/// Visible category located at `path` (root first, own id last).
pub fn category(path: &[i64], sortorder: i32, name: &str) -> Category {
    let id = path[path.len() - 1];
    let parent = if path.len() > 1 { path[path.len() - 2] } else { 0 };
    Category {
        id,
        parent,
        path: join_path(path),
        depth: path.len() as i32,
        sortorder,
        name: name.to_string(),
        idnumber: Some(format!("CAT-{}", id)),
        description: Some(format!("About {}", name)),
        visible: true,
        visibleold: true,
        theme: Some("boost".to_string()),
        ..Category::default()
    }
}

pub fn hidden(mut category: Category) -> Category {
    category.visible = false;
    category
}

pub fn plain_user() -> AuthUser {
    AuthUser {
        id: USER_ID,
        role: "user".to_string(),
    }
}

pub fn manager() -> AuthUser {
    AuthUser {
        id: MANAGER_ID,
        role: "manager".to_string(),
    }
}

pub fn auditor() -> AuthUser {
    AuthUser {
        id: AUDITOR_ID,
        role: "auditor".to_string(),
    }
}

pub fn store_of(categories: Vec<Category>) -> Arc<MemoryRepository> {
    Arc::new(MemoryRepository::with_categories(categories))
}

pub async fn with_users(repo: &MemoryRepository) {
    for user in [plain_user(), manager(), auditor()] {
        repo.insert_user(User {
            id: user.id,
            email: format!("{}@example.com", user.role),
            role: user.role,
        })
        .await;
    }
}

pub fn oracle(repo: &Arc<MemoryRepository>) -> OracleState {
    let store: RepositoryState = repo.clone();
    Arc::new(StoreVisibilityOracle::new(store))
}

pub fn context_for(repo: &Arc<MemoryRepository>, user: AuthUser) -> RequestContext {
    RequestContext::new(user, oracle(repo))
}

pub async fn view_for(
    repo: &Arc<MemoryRepository>,
    user: AuthUser,
    cache: Arc<MemoryChildCache>,
) -> CategoryView {
    let context = context_for(repo, user);
    let store: RepositoryState = repo.clone();
    CategoryView::for_request(&context, store, cache)
        .await
        .expect("visibility should load from the memory store")
}

/// View over an already computed partition, as the handlers build it.
pub fn view_with(
    repo: &Arc<MemoryRepository>,
    visibility: Arc<VisibilitySet>,
    cache: Arc<MemoryChildCache>,
) -> CategoryView {
    let store: RepositoryState = repo.clone();
    CategoryView::new(store, visibility, cache)
}

pub fn ids(categories: &[Category]) -> Vec<i64> {
    categories.iter().map(|c| c.id).collect()
}

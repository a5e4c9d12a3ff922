use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Category browsing for any authenticated principal. The `AuthUser` middleware on the
/// layer above guarantees each handler receives a resolved principal, whose visibility
/// partition then drives every response.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /categories/top
        // Landing category of the principal.
        .route("/categories/top", get(handlers::get_user_top))
        // GET /categories/browse?categoryid=&sort=&page=&perpage=
        // Browse page: a category with one page of its visible children.
        .route("/categories/browse", get(handlers::browse_categories))
        // GET /categories/{id}/children?sort=&offset=&limit=
        // Visible children, hidden categories replaced by their visible descendants.
        .route("/categories/{id}/children", get(handlers::get_children))
        // GET /categories/{id}/count
        .route("/categories/{id}/count", get(handlers::get_children_count))
        // GET /categories/{id}/tree?depth=&limit=
        // Nested tree for rendering.
        .route("/categories/{id}/tree", get(handlers::get_tree))
        // GET /categories/{id}/breadcrumb
        .route("/categories/{id}/breadcrumb", get(handlers::get_breadcrumb))
        // POST /webservice/categories
        // Machine-readable search with path/depth rewriting.
        .route("/webservice/categories", post(handlers::search_categories))
}

use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Category management views. Mounted under `/admin`; each handler checks the manage
/// capability of the resolved `AuthUser` before doing any work.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/categories/listing?selected=&expanded=
        // Management listing with expanded rows and the visible selection chain.
        .route("/categories/listing", get(handlers::get_admin_listing))
}

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Request plumbing: identity, configuration, errors, HTTP handlers.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;

// Category domain: records, store access, ordering.
pub mod models;
pub mod repository;
pub mod sort;

// Visibility-aware tree engine.
pub mod cache;
pub mod children;
pub mod compactor;
pub mod external;
pub mod view;
pub mod visibility;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use cache::CacheRegistry;
pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use visibility::{OracleState, StoreVisibilityOracle};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI document
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_user_top, handlers::get_children, handlers::get_children_count,
        handlers::browse_categories, handlers::get_tree, handlers::get_breadcrumb,
        handlers::search_categories, handlers::get_admin_listing
    ),
    components(
        schemas(
            models::Category, models::CategoryInfo, models::CriteriaEntry,
            models::GetCategoriesRequest, models::CategoryChildren, models::ChildrenCount,
            models::CategoryPage, models::CategoryTreeNode, models::ListingItem,
            models::CategoryListing, error::ErrorResponse,
        )
    ),
    tags(
        (name = "categories", description = "Visibility-aware category tree API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Single shared container for the services every request needs. Cloning is cheap: every
/// service sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Category store (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Authorization collaborator answering visibility and context questions.
    pub oracle: OracleState,
    /// Per-principal sorted-children caches.
    pub caches: Arc<CacheRegistry>,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires the store-backed oracle and a cache registry honoring the configured lifetime.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let oracle = Arc::new(StoreVisibilityOracle::new(repo.clone())) as OracleState;
        let caches = Arc::new(CacheRegistry::new(Duration::from_secs(
            config.cache_lifetime_secs,
        )));
        Self {
            repo,
            oracle,
            caches,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for OracleState {
    fn from_ref(app_state: &AppState) -> OracleState {
        app_state.oracle.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the `authenticated_routes`. Extraction of `AuthUser` rejects
/// with 401 before the handler runs when the request carries no valid identity.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Capability checks for '/admin' happen inside the handlers.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span, tagging it with the `x-request-id` header so every log line
/// of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

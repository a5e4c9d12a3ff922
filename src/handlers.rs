use crate::{
    AppState,
    auth::AuthUser,
    error::{CategoryError, ErrorResponse},
    external,
    models::{
        BrowseQuery, Category, CategoryChildren, CategoryInfo, CategoryListing, CategoryPage,
        CategoryTreeNode, ChildrenCount, ChildrenQuery, GetCategoriesRequest, ListingQuery,
        TreeQuery,
    },
    sort::SortSpec,
    view::{CategoryView, ChildrenOptions},
    visibility::RequestContext,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

// --- Request Plumbing ---

/// Builds the view for one request: a fresh request context (visibility computed once)
/// over the principal's session cache for that partition.
async fn request_view(state: &AppState, user: AuthUser) -> Result<CategoryView, CategoryError> {
    let context = RequestContext::new(user, state.oracle.clone());
    let visibility = context.visibility().await?;
    let cache = state.caches.cache_for(context.principal().id, &visibility);
    Ok(CategoryView::new(state.repo.clone(), visibility, cache))
}

fn parse_id_list(raw: Option<&str>) -> Vec<i64> {
    raw.unwrap_or_default()
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

// --- Handlers ---

/// get_user_top
///
/// [Authenticated Route] The landing category of the caller: the only visible top-level
/// category when there is exactly one, the synthetic top category (id 0) otherwise.
#[utoipa::path(
    get,
    path = "/categories/top",
    responses((status = 200, description = "User top category", body = Category))
)]
pub async fn get_user_top(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Category>, CategoryError> {
    let view = request_view(&state, user).await?;
    Ok(Json(view.user_top_category().await?))
}

/// get_children
///
/// [Authenticated Route] One page of the effectively visible children of a category.
/// Children of hidden categories are promoted into their place.
#[utoipa::path(
    get,
    path = "/categories/{id}/children",
    params(("id" = i64, Path, description = "Category ID, 0 for the top"), ChildrenQuery),
    responses(
        (status = 200, description = "Visible children", body = CategoryChildren),
        (status = 400, description = "Unknown sort field", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_children(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Json<CategoryChildren>, CategoryError> {
    let options = ChildrenOptions {
        sort: SortSpec::parse(query.sort.as_deref())?,
        offset: query.offset.unwrap_or(0),
        limit: query.limit,
    };
    let view = request_view(&state, user).await?;
    let category = view.category(id).await?;
    let children = view.children_of(&category, &options).await?;
    Ok(Json(CategoryChildren {
        parent: category.id,
        children,
    }))
}

/// get_children_count
///
/// [Authenticated Route] Number of effectively visible children of a category.
#[utoipa::path(
    get,
    path = "/categories/{id}/count",
    params(("id" = i64, Path, description = "Category ID, 0 for the top")),
    responses((status = 200, description = "Children count", body = ChildrenCount))
)]
pub async fn get_children_count(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChildrenCount>, CategoryError> {
    let view = request_view(&state, user).await?;
    let category = view.category(id).await?;
    let children_count = view.children_count(&category).await?;
    Ok(Json(ChildrenCount {
        id: category.id,
        children_count,
    }))
}

/// browse_categories
///
/// [Authenticated Route] Category browse page. Without `categoryid` the caller's top
/// category is shown. `perpage` falls back to the configured page size.
#[utoipa::path(
    get,
    path = "/categories/browse",
    params(BrowseQuery),
    responses((status = 200, description = "Browse page", body = CategoryPage))
)]
pub async fn browse_categories(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<CategoryPage>, CategoryError> {
    let sort = SortSpec::parse(query.sort.as_deref())?;
    let per_page = query.perpage.unwrap_or(state.config.per_page);
    let view = request_view(&state, user).await?;
    let page = view
        .browse(query.categoryid, sort, query.page.unwrap_or(0), per_page)
        .await?;
    Ok(Json(page))
}

/// get_tree
///
/// [Authenticated Route] Nested category tree for rendering, `depth` levels deep (default
/// from configuration), at most `limit` children per level (default: page size).
#[utoipa::path(
    get,
    path = "/categories/{id}/tree",
    params(("id" = i64, Path, description = "Root category ID, 0 for the top"), TreeQuery),
    responses((status = 200, description = "Category tree", body = CategoryTreeNode))
)]
pub async fn get_tree(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<CategoryTreeNode>, CategoryError> {
    let depth = query.depth.unwrap_or(state.config.max_category_depth);
    let limit = query.limit.or(Some(state.config.per_page));
    let view = request_view(&state, user).await?;
    let root = view.category(id).await?;
    Ok(Json(view.tree(root, depth, limit).await?))
}

/// get_breadcrumb
///
/// [Authenticated Route] Ancestors of a category the caller may view, root first.
#[utoipa::path(
    get,
    path = "/categories/{id}/breadcrumb",
    params(("id" = i64, Path, description = "Category ID")),
    responses((status = 200, description = "Visible ancestors", body = [Category]))
)]
pub async fn get_breadcrumb(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Category>>, CategoryError> {
    let view = request_view(&state, user).await?;
    let category = view.category(id).await?;
    Ok(Json(view.breadcrumb(&category).await?))
}

/// search_categories
///
/// [Authenticated Route] Machine-readable category search. Hidden categories are left out
/// and their descendants come back with `parent`, `path` and `depth` rewritten as if the
/// hidden categories did not exist. Administrative fields are only returned to managers.
#[utoipa::path(
    post,
    path = "/webservice/categories",
    request_body = GetCategoriesRequest,
    responses(
        (status = 200, description = "Matching categories", body = [CategoryInfo]),
        (status = 400, description = "Unsupported criteria", body = ErrorResponse),
        (status = 403, description = "Forbidden criteria or invalid context", body = ErrorResponse)
    )
)]
pub async fn search_categories(
    user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<GetCategoriesRequest>,
) -> Result<Json<Vec<CategoryInfo>>, CategoryError> {
    let context = RequestContext::new(user, state.oracle.clone());
    let categories = external::get_categories(&context, &state.repo, &request).await?;
    Ok(Json(categories))
}

/// get_admin_listing
///
/// [Admin Route] Management listing of the category tree.
///
/// *Authorization*: requires the manage capability.
#[utoipa::path(
    get,
    path = "/admin/categories/listing",
    params(ListingQuery),
    responses(
        (status = 200, description = "Listing", body = CategoryListing),
        (status = 403, description = "Not a manager", body = ErrorResponse)
    )
)]
pub async fn get_admin_listing(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<CategoryListing>, CategoryError> {
    if !user.capabilities().manage {
        return Err(CategoryError::MissingCapability("category:manage"));
    }
    let expanded = parse_id_list(query.expanded.as_deref());
    let view = request_view(&state, user).await?;
    let selected = match query.selected {
        Some(id) => Some(view.category(id).await?),
        None => None,
    };
    Ok(Json(view.listing(selected.as_ref(), &expanded).await?))
}

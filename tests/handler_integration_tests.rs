mod common;

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    response::IntoResponse,
};
use category_visibility::{
    AppState,
    config::AppConfig,
    create_router,
    error::{CategoryError, ErrorResponse},
    handlers,
    models::{
        BrowseQuery, Category, CategoryInfo, ChildrenQuery, CriteriaEntry, GetCategoriesRequest,
        ListingQuery, TreeQuery,
    },
    repository::MemoryRepository,
};
use common::{category, hidden, ids, manager, plain_user, store_of, with_users};
use std::sync::Arc;
use tokio::test;
use tower::ServiceExt;

// --- TEST UTILITIES ---

fn sample_tree() -> Vec<Category> {
    vec![
        category(&[1], 1, "Faculty"),
        hidden(category(&[1, 2], 1, "Archive")),
        category(&[1, 2, 3], 1, "Physics"),
        category(&[1, 4], 2, "Chemistry"),
    ]
}

fn create_test_state(repo: Arc<MemoryRepository>) -> AppState {
    AppState::new(repo, AppConfig::default())
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("response body should be JSON")
}

// --- HANDLER TESTS ---

#[test]
async fn test_get_children_promotes_past_hidden() {
    let state = create_test_state(store_of(sample_tree()));

    let result = handlers::get_children(
        plain_user(),
        State(state),
        Path(1),
        Query(ChildrenQuery::default()),
    )
    .await;

    let Json(children) = result.unwrap();
    assert_eq!(children.parent, 1);
    assert_eq!(ids(&children.children), vec![3, 4]);
}

#[test]
async fn test_get_children_rejects_unknown_sort() {
    let state = create_test_state(store_of(sample_tree()));

    let result = handlers::get_children(
        plain_user(),
        State(state),
        Path(1),
        Query(ChildrenQuery {
            sort: Some("colour".to_string()),
            ..ChildrenQuery::default()
        }),
    )
    .await;

    let response = result.unwrap_err().into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = body_json(response).await;
    assert_eq!(body.errorcode, "criteriaerror");
}

#[test]
async fn test_get_children_of_hidden_category_is_not_found() {
    let state = create_test_state(store_of(sample_tree()));

    let result = handlers::get_children(
        plain_user(),
        State(state),
        Path(2),
        Query(ChildrenQuery::default()),
    )
    .await;

    let error = result.unwrap_err();
    assert!(matches!(error, CategoryError::NotFound(2)));
    assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_get_children_count_matches_listing() {
    let state = create_test_state(store_of(sample_tree()));

    let Json(count) = handlers::get_children_count(plain_user(), State(state), Path(1))
        .await
        .unwrap();

    assert_eq!(count.id, 1);
    assert_eq!(count.children_count, 2);
}

#[test]
async fn test_children_lookups_share_the_principal_cache() {
    let repo = store_of(sample_tree());
    let state = create_test_state(repo.clone());
    let visibility = common::context_for(&repo, plain_user())
        .visibility()
        .await
        .unwrap();

    let Json(count) = handlers::get_children_count(plain_user(), State(state.clone()), Path(1))
        .await
        .unwrap();
    assert_eq!(count.children_count, 2);
    let stats = state.caches.cache_for(common::USER_ID, &visibility).stats();

    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entry_count, 1);

    let Json(count) = handlers::get_children_count(plain_user(), State(state.clone()), Path(1))
        .await
        .unwrap();
    assert_eq!(count.children_count, 2);
    assert_eq!(state.caches.cache_for(common::USER_ID, &visibility).stats().hits, 1);
}

#[test]
async fn test_hidden_category_drops_out_of_cached_children() {
    let repo = store_of(sample_tree());
    let state = create_test_state(repo.clone());

    let Json(children) = handlers::get_children(
        plain_user(),
        State(state.clone()),
        Path(1),
        Query(ChildrenQuery::default()),
    )
    .await
    .unwrap();
    assert_eq!(ids(&children.children), vec![3, 4]);

    repo.insert_category(hidden(category(&[1, 4], 2, "Chemistry"))).await;

    let Json(children) = handlers::get_children(
        plain_user(),
        State(state),
        Path(1),
        Query(ChildrenQuery::default()),
    )
    .await
    .unwrap();
    assert_eq!(ids(&children.children), vec![3]);
}

#[test]
async fn test_get_user_top_single_visible_root() {
    let state = create_test_state(store_of(sample_tree()));

    let Json(top) = handlers::get_user_top(plain_user(), State(state))
        .await
        .unwrap();

    assert_eq!(top.id, 1);
}

#[test]
async fn test_browse_uses_configured_page_size() {
    let state = create_test_state(store_of(sample_tree()));

    let Json(page) = handlers::browse_categories(
        plain_user(),
        State(state),
        Query(BrowseQuery {
            categoryid: Some(1),
            ..BrowseQuery::default()
        }),
    )
    .await
    .unwrap();

    assert_eq!(page.category.id, 1);
    assert_eq!(page.per_page, 20);
    assert_eq!(page.page, 0);
    assert_eq!(ids(&page.children), vec![3, 4]);
}

#[test]
async fn test_get_tree_defaults() {
    let state = create_test_state(store_of(sample_tree()));

    let Json(tree) = handlers::get_tree(
        plain_user(),
        State(state),
        Path(0),
        Query(TreeQuery::default()),
    )
    .await
    .unwrap();

    assert!(tree.category.is_top());
    assert_eq!(tree.children.len(), 1);
    let faculty = &tree.children[0];
    assert_eq!(faculty.category.id, 1);
    assert_eq!(faculty.children.len(), 2);
    assert!(!faculty.has_more);
}

#[test]
async fn test_get_breadcrumb() {
    let state = create_test_state(store_of(sample_tree()));

    let Json(crumbs) = handlers::get_breadcrumb(plain_user(), State(state), Path(3))
        .await
        .unwrap();

    assert_eq!(ids(&crumbs), vec![1]);
}

#[test]
async fn test_search_categories_rewrites_paths() {
    let state = create_test_state(store_of(sample_tree()));

    let Json(infos) = handlers::search_categories(
        plain_user(),
        State(state),
        Json(GetCategoriesRequest::default()),
    )
    .await
    .unwrap();

    let physics = infos.iter().find(|info| info.id == 3).unwrap();
    assert_eq!(physics.path, "/1/3");
    assert_eq!(physics.parent, 1);
    assert!(infos.iter().all(|info| info.id != 2));
}

#[test]
async fn test_search_categories_forbidden_criteria() {
    let state = create_test_state(store_of(sample_tree()));

    let result = handlers::search_categories(
        plain_user(),
        State(state),
        Json(GetCategoriesRequest {
            criteria: vec![CriteriaEntry {
                key: "idnumber".to_string(),
                value: "CAT-1".to_string(),
            }],
            addsubcategories: true,
        }),
    )
    .await;

    let response = result.unwrap_err().into_response();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: ErrorResponse = body_json(response).await;
    assert_eq!(body.errorcode, "criteriaerror");
    assert!(body.message.contains("idnumber"));
}

#[test]
async fn test_get_admin_listing_forbidden() {
    let state = create_test_state(store_of(sample_tree()));

    let result = handlers::get_admin_listing(
        plain_user(),
        State(state),
        Query(ListingQuery::default()),
    )
    .await;

    let error = result.unwrap_err();
    assert!(matches!(error, CategoryError::MissingCapability(_)));
    assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_get_admin_listing_success() {
    let state = create_test_state(store_of(sample_tree()));

    // Managers see hidden categories, so 2 is part of the selected chain.
    let Json(listing) = handlers::get_admin_listing(
        manager(),
        State(state),
        Query(ListingQuery {
            selected: Some(3),
            expanded: Some("4, x".to_string()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(listing.selected_category, Some(3));
    assert_eq!(listing.selected_parents, vec![1, 2, 3]);
    assert_eq!(listing.items.len(), 1);
    assert_eq!(ids(&listing.items[0].subcategories), vec![2, 4]);
}

#[test]
async fn test_store_failure_maps_to_generic_500() {
    let repo = store_of(sample_tree());
    repo.set_failing(true);
    let state = create_test_state(repo);

    let result = handlers::get_user_top(plain_user(), State(state)).await;

    let response = result.unwrap_err().into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = body_json(response).await;
    assert_eq!(body.errorcode, "storeerror");
    assert!(!body.message.contains("simulated"));
}

// --- ROUTER TESTS ---

#[test]
async fn test_router_requires_authentication() {
    let app = create_router(create_test_state(store_of(sample_tree())));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/categories/1/children")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
async fn test_router_health_is_public() {
    let app = create_router(create_test_state(store_of(vec![])));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[test]
async fn test_router_search_with_local_bypass() {
    let repo = store_of(sample_tree());
    with_users(&repo).await;
    let app = create_router(create_test_state(repo));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webservice/categories")
                .header("x-user-id", common::USER_ID.to_string())
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"criteria":[{"key":"id","value":"3"}]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let infos: Vec<CategoryInfo> = body_json(response).await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].path, "/1/3");
    assert_eq!(infos[0].depth, 2);
}

#[test]
async fn test_router_children_with_query_parameters() {
    let repo = store_of(sample_tree());
    with_users(&repo).await;
    let app = create_router(create_test_state(repo));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/categories/1/children?sort=-name&limit=1")
                .header("x-user-id", common::USER_ID.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let children: category_visibility::models::CategoryChildren = body_json(response).await;
    // Physics > Chemistry by name descending.
    assert_eq!(ids(&children.children), vec![3]);
}

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use category_visibility::{
    AppState,
    auth::{AuthUser, Capabilities, Claims},
    config::{AppConfig, Env},
    models::User,
    repository::MemoryRepository,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";
const TEST_USER_ID: Uuid = Uuid::from_u128(1);

fn create_token(user_id: Uuid, exp_offset: u64, secret: &str) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs();

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

async fn create_app_state(env: Env, users: Vec<User>) -> AppState {
    let repo = MemoryRepository::new();
    for user in users {
        repo.insert_user(user).await;
    }

    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::new(Arc::new(repo), config)
}

fn test_user(id: Uuid, role: &str) -> User {
    User {
        id,
        email: format!("{}@example.com", role),
        role: role.to_string(),
    }
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let token = create_token(TEST_USER_ID, 3600, TEST_JWT_SECRET);
    let app_state = create_app_state(
        Env::Production,
        vec![test_user(TEST_USER_ID, "auditor")],
    )
    .await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .expect("valid token should authenticate");

    assert_eq!(user.id, TEST_USER_ID);
    assert_eq!(user.role, "auditor");
    assert!(user.capabilities().view_hidden);
    assert!(!user.capabilities().manage);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, vec![]).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_foreign_signature() {
    let token = create_token(TEST_USER_ID, 3600, "some-other-secret");
    let app_state = create_app_state(
        Env::Production,
        vec![test_user(TEST_USER_ID, "user")],
    )
    .await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_for_unknown_user() {
    let token = create_token(TEST_USER_ID, 3600, TEST_JWT_SECRET);
    let app_state = create_app_state(Env::Production, vec![]).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_store_outage_is_server_error() {
    let repo = Arc::new(MemoryRepository::new());
    repo.insert_user(test_user(TEST_USER_ID, "user")).await;
    repo.set_failing(true);
    let config = AppConfig {
        env: Env::Local,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    let app_state = AppState::new(repo, config);

    let token = create_token(TEST_USER_ID, 3600, TEST_JWT_SECRET);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(auth_user.unwrap_err(), StatusCode::INTERNAL_SERVER_ERROR);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&TEST_USER_ID.to_string()).unwrap(),
    );
    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert_eq!(auth_user.unwrap_err(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let mock_user_id = Uuid::new_v4();
    let app_state = create_app_state(Env::Local, vec![test_user(mock_user_id, "admin")]).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&mock_user_id.to_string()).unwrap(),
    );

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .expect("local bypass should authenticate");

    assert_eq!(user.id, mock_user_id);
    assert_eq!(user.role, "admin");
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let mock_user_id = Uuid::new_v4();
    let app_state =
        create_app_state(Env::Production, vec![test_user(mock_user_id, "admin")]).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&mock_user_id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert_eq!(auth_user.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_capabilities() {
    assert_eq!(
        Capabilities::for_role("admin"),
        Capabilities {
            manage: true,
            view_hidden: true
        }
    );
    assert_eq!(Capabilities::for_role("manager"), Capabilities::for_role("admin"));
    assert_eq!(
        Capabilities::for_role("auditor"),
        Capabilities {
            manage: false,
            view_hidden: true
        }
    );
    assert_eq!(Capabilities::for_role("student"), Capabilities::default());
    // Roles are matched exactly.
    assert_eq!(Capabilities::for_role("Admin"), Capabilities::default());
}

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use union_board::{
    AppState,
    auth::{AuthUser, Claims},
    config::{AppConfig, Env},
    models::{Role, User},
    repository::{InMemoryRepository, Repository, RepositoryState},
    storage::MockStorageService,
};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn create_token_signed_with(user_id: Uuid, exp_offset: i64, secret: &str) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn create_token(user_id: Uuid, exp_offset: i64) -> String {
    create_token_signed_with(user_id, exp_offset, TEST_JWT_SECRET)
}

fn create_app_state(env: Env, repo: RepositoryState, jwt_secret: String) -> AppState {
    let mut config = AppConfig::default();
    config.env = env;
    config.jwt_secret = jwt_secret;

    AppState {
        repo,
        storage: Arc::new(MockStorageService::new()),
        config,
    }
}

async fn seeded_repo(user_id: Uuid, role: Role) -> RepositoryState {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    repo.create_user(User {
        id: user_id,
        email: "test@union.test".to_string(),
        role,
    })
    .await
    .unwrap();
    repo
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let user_id = Uuid::new_v4();
    let token = create_token(user_id, 3600);
    let repo = seeded_repo(user_id, Role::Signatory).await;

    let app_state = create_app_state(Env::Production, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_ok());
    let user = auth_user.unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.role, Role::Signatory);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let app_state = create_app_state(Env::Production, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_err());
    assert_eq!(
        auth_user.unwrap_err().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_auth_failure_with_wrong_scheme() {
    let user_id = Uuid::new_v4();
    let token = create_token(user_id, 3600);
    let repo = seeded_repo(user_id, Role::Author).await;
    let app_state = create_app_state(Env::Production, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Token {}", token)).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_err());
    assert_eq!(
        auth_user.unwrap_err().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let user_id = Uuid::new_v4();
    // The decoder tolerates 60 seconds of clock skew, so the expiry has to sit
    // well past that window to be rejected.
    let token = create_token(user_id, -3600);
    let repo = seeded_repo(user_id, Role::Author).await;
    let app_state = create_app_state(Env::Production, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_err());
    assert_eq!(
        auth_user.unwrap_err().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_auth_failure_with_forged_signature() {
    let user_id = Uuid::new_v4();
    let token = create_token_signed_with(user_id, 3600, "some-other-secret-entirely");
    let repo = seeded_repo(user_id, Role::Author).await;
    let app_state = create_app_state(Env::Production, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_err());
    assert_eq!(
        auth_user.unwrap_err().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_auth_failure_when_profile_is_gone() {
    // A structurally valid token whose subject has no profile mirror row.
    let user_id = Uuid::new_v4();
    let token = create_token(user_id, 3600);
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let app_state = create_app_state(Env::Production, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_err());
    assert_eq!(
        auth_user.unwrap_err().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_role_is_read_fresh_from_the_profile() {
    let user_id = Uuid::new_v4();
    let token = create_token(user_id, 3600);
    let repo = seeded_repo(user_id, Role::Author).await;
    let app_state = create_app_state(Env::Production, repo.clone(), TEST_JWT_SECRET.to_string());

    // A grant lands after the token was issued; the profile wins.
    repo.set_user_role(user_id, Role::Signatory).await.unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.role, Role::Signatory);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let mock_user_id = Uuid::new_v4();
    let repo = seeded_repo(mock_user_id, Role::Admin).await;
    let app_state = create_app_state(Env::Local, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&mock_user_id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_ok());
    let user = auth_user.unwrap();
    assert_eq!(user.id, mock_user_id);
    assert_eq!(user.role, Role::Admin);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let mock_user_id = Uuid::new_v4();
    let repo = seeded_repo(mock_user_id, Role::Admin).await;
    let app_state = create_app_state(Env::Production, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&mock_user_id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_err());
    assert_eq!(
        auth_user.unwrap_err().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_local_bypass_falls_through_for_unknown_ids() {
    // The header names a UUID with no profile; with no Bearer token behind it
    // the request fails the JWT flow instead of silently succeeding.
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let app_state = create_app_state(Env::Local, repo, TEST_JWT_SECRET.to_string());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state).await;

    assert!(auth_user.is_err());
    assert_eq!(
        auth_user.unwrap_err().status_code(),
        StatusCode::UNAUTHORIZED
    );
}

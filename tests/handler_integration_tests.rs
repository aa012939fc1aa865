use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use tokio::test;
use union_board::{
    AppState,
    auth::AuthUser,
    config::AppConfig,
    handlers::{self, AdminListQuery, FeedQuery},
    models::{
        AddSignatoryRequest, Announcement, AnnouncementDetail, CreateAnnouncementRequest,
        LifecycleState, PresignedUrlRequest, PresignedUrlResponse, Role, User,
    },
    registry,
    repository::{InMemoryRepository, Repository, RepositoryState},
    storage::MockStorageService,
};
use uuid::Uuid;

// --- TEST UTILITIES ---

// Creates an AppState over the shared in-memory store and mock storage.
fn create_test_state(repo: &RepositoryState, storage_control: MockStorageService) -> AppState {
    AppState {
        repo: repo.clone(),
        storage: Arc::new(storage_control),
        config: AppConfig::default(),
    }
}

fn new_repo() -> RepositoryState {
    Arc::new(InMemoryRepository::new()) as RepositoryState
}

async fn seed_user(repo: &RepositoryState, role: Role) -> AuthUser {
    let id = Uuid::new_v4();
    repo.create_user(User {
        id,
        email: format!("{id}@union.test"),
        role,
    })
    .await
    .unwrap();
    AuthUser { id, role }
}

async fn seed_signatory(repo: &RepositoryState, name: &str) -> AuthUser {
    let user = seed_user(repo, Role::Author).await;
    registry::register_signatory(
        repo,
        AddSignatoryRequest {
            user_id: user.id,
            name: name.to_string(),
            title: "Committee Member".to_string(),
            contact: None,
        },
    )
    .await
    .unwrap();
    AuthUser {
        id: user.id,
        role: Role::Signatory,
    }
}

async fn seed_draft(repo: &RepositoryState, author: &AuthUser, key: Option<&str>) -> Announcement {
    repo.create_announcement(
        CreateAnnouncementRequest {
            title: "Gym refurbishment".to_string(),
            body: "The gym closes for two weeks in June.".to_string(),
            category: "facilities".to_string(),
            session: "2025/2026".to_string(),
            attachment_key: key.map(str::to_string),
        },
        author.id,
    )
    .await
    .unwrap()
}

/// Drives a draft straight to 'published' through the repository, bypassing the
/// quorum flow these tests are not about.
async fn seed_published(
    repo: &RepositoryState,
    author: &AuthUser,
    signer: &AuthUser,
    key: Option<&str>,
) -> Announcement {
    let a = seed_draft(repo, author, key).await;
    let a = repo
        .submit_announcement(a.id, a.version, &[signer.id], 1)
        .await
        .unwrap()
        .unwrap();
    let a = repo
        .transition_state(
            a.id,
            a.version,
            LifecycleState::PendingApproval,
            LifecycleState::Approved,
        )
        .await
        .unwrap()
        .unwrap();
    repo.publish_announcement(a.id, a.version)
        .await
        .unwrap()
        .unwrap()
}

// --- HANDLER TESTS ---

#[test]
async fn test_get_announcement_details_success() {
    let repo = new_repo();
    let author = seed_user(&repo, Role::Author).await;
    let signer = seed_signatory(&repo, "Alice Molloy").await;
    let published = seed_published(&repo, &author, &signer, None).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let result = handlers::get_announcement_details(State(state), Path(published.id)).await;

    assert!(result.is_ok());

    let response = result.unwrap();
    let axum_response = response.into_response();
    let (_parts, body) = axum_response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let detail: AnnouncementDetail = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(detail.announcement.id, published.id);
    assert!(detail.attachment_url.is_none());
}

#[test]
async fn test_get_announcement_details_resolves_the_attachment() {
    let repo = new_repo();
    let author = seed_user(&repo, Role::Author).await;
    let signer = seed_signatory(&repo, "Alice Molloy").await;
    let published = seed_published(&repo, &author, &signer, Some("attachments/poster.png")).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let Json(detail) = handlers::get_announcement_details(State(state), Path(published.id))
        .await
        .unwrap();

    let url = detail.attachment_url.expect("expected a download URL");
    assert!(url.contains("attachments/poster.png"));
    assert!(url.contains("signature=fake-download"));
}

#[test]
async fn test_get_announcement_details_not_found() {
    let repo = new_repo();
    let state = create_test_state(&repo, MockStorageService::new());

    let result = handlers::get_announcement_details(State(state), Path(Uuid::new_v4())).await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().status_code(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_feed_paging_is_clamped() {
    let repo = new_repo();
    let state = create_test_state(&repo, MockStorageService::new());

    let query = FeedQuery {
        category: None,
        session: None,
        search: None,
        page: Some(0),
        page_size: Some(500),
    };
    let Json(page) = handlers::get_announcements(State(state), Query(query))
        .await
        .unwrap();

    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 50);
}

#[test]
async fn test_get_pending_announcements_forbidden_for_authors() {
    let repo = new_repo();
    let author = seed_user(&repo, Role::Author).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let result = handlers::get_pending_announcements(author, State(state)).await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().status_code(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_get_pending_announcements_lists_the_worklist() {
    let repo = new_repo();
    let author = seed_user(&repo, Role::Author).await;
    let signer = seed_signatory(&repo, "Bob Whelan").await;
    let draft = seed_draft(&repo, &author, None).await;
    repo.submit_announcement(draft.id, draft.version, &[signer.id], 1)
        .await
        .unwrap()
        .unwrap();
    let state = create_test_state(&repo, MockStorageService::new());

    let Json(worklist) = handlers::get_pending_announcements(signer, State(state))
        .await
        .unwrap();

    assert_eq!(worklist.len(), 1);
    assert_eq!(worklist[0].id, draft.id);
}

#[test]
async fn test_get_admin_stats_forbidden() {
    let repo = new_repo();
    let author = seed_user(&repo, Role::Author).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let result = handlers::get_admin_stats(author, State(state)).await;

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().status_code(), StatusCode::FORBIDDEN);
}

#[test]
async fn test_get_admin_stats_counts_states() {
    let repo = new_repo();
    let author = seed_user(&repo, Role::Author).await;
    let signer = seed_signatory(&repo, "Cara Nolan").await;
    let admin = seed_user(&repo, Role::Admin).await;

    seed_draft(&repo, &author, None).await;
    seed_published(&repo, &author, &signer, None).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let Json(stats) = handlers::get_admin_stats(admin, State(state)).await.unwrap();

    assert_eq!(stats.total_announcements, 2);
    assert_eq!(stats.draft, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.active_signatories, 1);
    assert_eq!(stats.total_signatories, 1);
}

#[test]
async fn test_get_admin_announcements_narrows_by_state() {
    let repo = new_repo();
    let author = seed_user(&repo, Role::Author).await;
    let signer = seed_signatory(&repo, "Dana Hughes").await;
    let admin = seed_user(&repo, Role::Admin).await;

    seed_draft(&repo, &author, None).await;
    seed_published(&repo, &author, &signer, None).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let query = AdminListQuery {
        state: Some(LifecycleState::Draft),
        page: None,
        page_size: None,
    };
    let Json(page) = handlers::get_admin_announcements(admin, State(state), Query(query))
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].state, LifecycleState::Draft);
}

#[test]
async fn test_get_presigned_url_success() {
    let repo = new_repo();
    let auth_user = seed_user(&repo, Role::Author).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let payload = PresignedUrlRequest {
        filename: "minutes_march.pdf".to_string(),
        file_type: "application/pdf".to_string(),
    };

    let response = handlers::get_presigned_url(auth_user, State(state), Json(payload)).await;
    let response = response.into_response();
    let (parts, body) = response.into_parts();
    let status = parts.status;
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let body_json: PresignedUrlResponse =
        serde_json::from_slice(&bytes).expect("Failed to deserialize JSON response from handler");

    assert_eq!(status, StatusCode::OK);

    // The URL comes from the mock storage backend and must embed the key the
    // handler generated.
    assert!(
        body_json
            .upload_url
            .starts_with("http://localhost:9000/mock-bucket/"),
        "Upload URL should start with the MockStorageService's base URL."
    );
    assert!(
        body_json.upload_url.contains(&body_json.resource_key),
        "Upload URL should contain the resource key generated by the handler."
    );

    assert!(body_json.resource_key.starts_with("attachments/"));
    assert!(body_json.resource_key.ends_with(".pdf"));
}

#[test]
async fn test_get_presigned_url_defaults_the_extension() {
    let repo = new_repo();
    let auth_user = seed_user(&repo, Role::Author).await;
    let state = create_test_state(&repo, MockStorageService::new());

    let payload = PresignedUrlRequest {
        filename: "noextension".to_string(),
        file_type: "application/octet-stream".to_string(),
    };

    let Json(body_json) = handlers::get_presigned_url(auth_user, State(state), Json(payload))
        .await
        .unwrap();

    assert!(body_json.resource_key.ends_with(".bin"));
}

#[test]
async fn test_get_presigned_url_storage_failure() {
    let repo = new_repo();
    let auth_user = seed_user(&repo, Role::Author).await;
    let state = create_test_state(&repo, MockStorageService::new_failing());

    let payload = PresignedUrlRequest {
        filename: "minutes_march.pdf".to_string(),
        file_type: "application/pdf".to_string(),
    };

    let result = handlers::get_presigned_url(auth_user, State(state), Json(payload)).await;

    assert!(result.is_err());
    assert_eq!(
        result.unwrap_err().status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
async fn test_remove_signatory_deactivates_and_404s_for_strangers() {
    let repo = new_repo();
    let admin = seed_user(&repo, Role::Admin).await;
    let member = seed_signatory(&repo, "Eve Byrne").await;
    let state = create_test_state(&repo, MockStorageService::new());

    let status =
        handlers::remove_signatory(admin.clone(), State(state.clone()), Path(member.id))
            .await
            .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Unknown principals are a 404, not a silent success.
    let result = handlers::remove_signatory(admin, State(state), Path(Uuid::new_v4())).await;
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().status_code(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_get_me_reports_the_signatory_flag() {
    let repo = new_repo();
    let member = seed_signatory(&repo, "Fred Kane").await;
    let state = create_test_state(&repo, MockStorageService::new());

    let Json(profile) = handlers::get_me(member.clone(), State(state.clone()))
        .await
        .unwrap();
    assert_eq!(profile.role, Role::Signatory);
    assert!(profile.is_active_signatory);

    // Deactivation clears the flag but the role stays until changed.
    registry::remove_signatory(&repo, member.id).await.unwrap();
    let Json(profile) = handlers::get_me(member, State(state)).await.unwrap();
    assert_eq!(profile.role, Role::Signatory);
    assert!(!profile.is_active_signatory);
}

use std::sync::Arc;
use union_board::{
    error::ApiError,
    models::{AddSignatoryRequest, Role, User},
    registry,
    repository::{InMemoryRepository, Repository, RepositoryState},
};
use uuid::Uuid;

fn new_repo() -> RepositoryState {
    Arc::new(InMemoryRepository::new()) as RepositoryState
}

async fn seed_user(repo: &RepositoryState, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    repo.create_user(User {
        id,
        email: format!("{id}@union.test"),
        role,
    })
    .await
    .unwrap();
    id
}

fn request_for(user_id: Uuid, name: &str) -> AddSignatoryRequest {
    AddSignatoryRequest {
        user_id,
        name: name.to_string(),
        title: "General Secretary".to_string(),
        contact: Some("gs@union.test".to_string()),
    }
}

#[tokio::test]
async fn registering_grants_the_signatory_role() {
    let repo = new_repo();
    let user_id = seed_user(&repo, Role::Author).await;

    let signatory = registry::register_signatory(&repo, request_for(user_id, "Alice"))
        .await
        .unwrap();
    assert_eq!(signatory.user_id, user_id);
    assert!(signatory.active);

    let user = repo.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.role, Role::Signatory);
}

#[tokio::test]
async fn registering_an_admin_keeps_the_admin_role() {
    let repo = new_repo();
    let user_id = seed_user(&repo, Role::Admin).await;

    registry::register_signatory(&repo, request_for(user_id, "Alice"))
        .await
        .unwrap();

    let user = repo.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.role, Role::Admin);
}

#[tokio::test]
async fn registering_an_unknown_principal_fails() {
    let repo = new_repo();

    let err = registry::register_signatory(&repo, request_for(Uuid::new_v4(), "Ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound("user")));
}

#[tokio::test]
async fn double_registration_is_refused_while_active() {
    let repo = new_repo();
    let user_id = seed_user(&repo, Role::Author).await;

    registry::register_signatory(&repo, request_for(user_id, "Alice"))
        .await
        .unwrap();
    let err = registry::register_signatory(&repo, request_for(user_id, "Alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::DuplicateSignatory));
}

#[tokio::test]
async fn deactivation_is_idempotent_and_keeps_the_role() {
    let repo = new_repo();
    let user_id = seed_user(&repo, Role::Author).await;
    registry::register_signatory(&repo, request_for(user_id, "Alice"))
        .await
        .unwrap();

    registry::remove_signatory(&repo, user_id).await.unwrap();
    assert!(repo.find_active_signatory(user_id).await.unwrap().is_none());

    // Repeat removal of a known principal is a quiet success.
    registry::remove_signatory(&repo, user_id).await.unwrap();

    // The role survives deactivation; the live flag is what gates decisions.
    let user = repo.get_user(user_id).await.unwrap().unwrap();
    assert_eq!(user.role, Role::Signatory);
}

#[tokio::test]
async fn removing_a_never_registered_principal_is_not_found() {
    let repo = new_repo();
    let user_id = seed_user(&repo, Role::Author).await;

    let err = registry::remove_signatory(&repo, user_id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound("signatory")));
}

#[tokio::test]
async fn reregistration_creates_a_fresh_record() {
    let repo = new_repo();
    let user_id = seed_user(&repo, Role::Author).await;

    let first = registry::register_signatory(&repo, request_for(user_id, "Alice"))
        .await
        .unwrap();
    registry::remove_signatory(&repo, user_id).await.unwrap();

    let second = registry::register_signatory(&repo, request_for(user_id, "Alice A."))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
    assert!(second.active);
    assert_eq!(second.name, "Alice A.");

    // History is append-only: both records remain, one active.
    let all = repo.list_all_signatories().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all.iter().filter(|s| s.active).count(), 1);

    let active = repo.list_active_signatories().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Alice A.");
}

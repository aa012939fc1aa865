use axum::response::IntoResponse;
use union_board::{
    error::ApiError,
    models::{Announcement, Decision, LifecycleState, Role, UpdateAnnouncementRequest},
};

// --- Wire Format Tests ---

#[test]
fn test_lifecycle_state_serializes_snake_case() {
    // The frontend and the database both speak snake_case; the serde rename
    // must match the Postgres enum labels exactly.
    assert_eq!(
        serde_json::to_string(&LifecycleState::PendingApproval).unwrap(),
        r#""pending_approval""#
    );
    assert_eq!(
        serde_json::from_str::<LifecycleState>(r#""approved""#).unwrap(),
        LifecycleState::Approved
    );
}

#[test]
fn test_role_and_decision_serialize_snake_case() {
    assert_eq!(serde_json::to_string(&Role::Author).unwrap(), r#""author""#);
    assert_eq!(
        serde_json::to_string(&Role::Signatory).unwrap(),
        r#""signatory""#
    );
    assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""admin""#);

    assert_eq!(
        serde_json::to_string(&Decision::Approve).unwrap(),
        r#""approve""#
    );
    assert_eq!(
        serde_json::from_str::<Decision>(r#""reject""#).unwrap(),
        Decision::Reject
    );
}

#[test]
fn test_lifecycle_state_displays_its_wire_name() {
    // Display feeds the invalid_state error messages, so it must match the
    // serialized form rather than the Rust variant name.
    assert_eq!(LifecycleState::PendingApproval.to_string(), "pending_approval");
    assert_eq!(LifecycleState::Draft.to_string(), "draft");
}

#[test]
fn test_update_announcement_request_optionality() {
    // This confirms the structure supports partial updates (all fields are Option<T>)
    let partial_update = UpdateAnnouncementRequest {
        title: Some("New Title Only".to_string()),
        body: None,
        category: None,
        session: None,
        attachment_key: None,
    };

    let json_output = serde_json::to_string(&partial_update).unwrap();
    assert!(json_output.contains(r#""title":"New Title Only""#));
    assert!(!json_output.contains("body")); // None fields are omitted
    assert!(!json_output.contains("category"));
}

#[test]
fn test_announcement_serializes_defaults() {
    let announcement = Announcement::default();
    let json_output = serde_json::to_string(&announcement).unwrap();

    assert!(json_output.contains(r#""state":"draft""#));
    assert!(json_output.contains(r#""version":0"#));
    // Nullable columns stay present as explicit nulls for the frontend.
    assert!(json_output.contains(r#""published_at":null"#));
}

// --- Error Body Tests ---

#[tokio::test]
async fn test_error_bodies_share_one_shape() {
    let response = ApiError::NotFound("announcement").into_response();
    assert_eq!(response.status(), 404);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], "announcement not found");
}

#[tokio::test]
async fn test_invalid_state_error_names_the_open_actions() {
    let state = LifecycleState::PendingApproval;
    let err = ApiError::InvalidState {
        state,
        allowed: state.allowed_actions().join(", "),
    };
    let response = err.into_response();
    assert_eq!(response.status(), 409);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["error"], "invalid_state");
    assert_eq!(
        body["message"],
        "not allowed in state 'pending_approval'; allowed next actions: [approve, reject, retract]"
    );
}

#[tokio::test]
async fn test_conflict_error_signals_retry() {
    let response = ApiError::Conflict.into_response();
    // Two straight guard losses surface as a retryable 503, not a client fault.
    assert_eq!(response.status(), 503);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "conflict");
}

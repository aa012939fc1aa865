use crate::{
    AppState,
    auth::AuthUser,
    engine,
    error::ApiError,
    models::{
        AddSignatoryRequest, AdminDashboardStats, Announcement, AnnouncementDetail,
        AnnouncementPage, ApprovalProgress, CreateAnnouncementRequest, Decision, LifecycleState,
        PresignedUrlRequest, PresignedUrlResponse, RegisterUserRequest, RetractRequest, Role,
        Signatory, UpdateAnnouncementRequest, User, UserProfile,
    },
    registry,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 50;

fn normalize_paging(page: Option<i64>, page_size: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

// --- Filter Structs ---

/// FeedQuery
///
/// Accepted query parameters for the public feed (GET /announcements). Used by
/// Axum's Query extractor to safely bind HTTP query parameters. Pagination is
/// 1-based and `page_size` is capped server-side.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct FeedQuery {
    /// Optional exact-match category filter.
    pub category: Option<String>,
    /// Optional exact-match academic session filter, e.g. "2025/2026".
    pub session: Option<String>,
    /// Case-insensitive substring match on the title.
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// AdminListQuery
///
/// Accepted query parameters for the admin listing (GET /admin/announcements).
#[derive(Deserialize, utoipa::IntoParams)]
pub struct AdminListQuery {
    /// Optional lifecycle-state filter, e.g. `pending_approval`.
    pub state: Option<LifecycleState>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// ProviderAuthResponse
///
/// Minimal struct to deserialize the response from the external auth provider's
/// signup endpoint, capturing the newly created user's UUID.
#[derive(Deserialize)]
struct ProviderAuthResponse {
    id: Uuid,
}

// --- Public Handlers ---

/// register_user
///
/// [Public Route] Handles initial user registration via the external auth service.
///
/// *Flow*: Calls the provider's signup endpoint, retrieves the canonical user UUID,
/// and creates the mirroring record in the local `public.profiles` table so primary
/// keys stay synchronized. Self-registration always yields the `author` role;
/// `signatory` is granted through the registry and `admin` out of band.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Registered", body = User),
        (status = 400, description = "Rejected by the auth provider")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<Json<User>, ApiError> {
    let provider_url = std::env::var("SUPABASE_URL")
        .map_err(|_| ApiError::Internal("SUPABASE_URL not configured".to_string()))?;
    let provider_key = std::env::var("SUPABASE_KEY")
        .map_err(|_| ApiError::Internal("SUPABASE_KEY not configured".to_string()))?;

    // Step 1: Call the external auth provider. The password passes through and
    // is never persisted or logged here.
    let client = reqwest::Client::new();
    let auth_url = format!("{}/auth/v1/signup", provider_url);

    let response = client
        .post(auth_url)
        .header("apikey", provider_key)
        .header("Content-Type", "application/json")
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !response.status().is_success() {
        // The provider rejects duplicates and weak passwords.
        return Err(ApiError::Registration(
            "the auth provider rejected the signup".to_string(),
        ));
    }

    // Step 2: Extract the canonical user ID from the external response.
    let provider_user = response
        .json::<ProviderAuthResponse>()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // Step 3: Mirror the profile locally, always as an author.
    let new_user = User {
        id: provider_user.id,
        email: payload.email,
        role: Role::Author,
    };
    let created_user = state.repo.create_user(new_user).await?;

    Ok(Json(created_user))
}

/// get_announcements
///
/// [Public Route] The public feed: published announcements only, newest first,
/// filterable by category and session with title search.
///
/// *Security*: The repository applies the `state = 'published'` filter
/// **unconditionally**, so drafts and pending items can never leak to anonymous
/// readers.
#[utoipa::path(
    get,
    path = "/announcements",
    params(FeedQuery),
    responses((status = 200, description = "Published announcements", body = AnnouncementPage))
)]
pub async fn get_announcements(
    State(state): State<AppState>,
    Query(filter): Query<FeedQuery>,
) -> Result<Json<AnnouncementPage>, ApiError> {
    let (page, page_size) = normalize_paging(filter.page, filter.page_size);
    let feed = state
        .repo
        .list_published(filter.category, filter.session, filter.search, page, page_size)
        .await?;
    Ok(Json(feed))
}

/// get_announcement_details
///
/// [Public Route] Detail view of one published announcement, including the
/// signatories who approved it (`signed_by`) and a short-lived download URL for
/// the attachment when present.
#[utoipa::path(
    get,
    path = "/announcements/{id}",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Found", body = AnnouncementDetail),
        (status = 404, description = "Not published or does not exist")
    )
)]
pub async fn get_announcement_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnnouncementDetail>, ApiError> {
    let announcement = state
        .repo
        .get_published_announcement(id)
        .await?
        .ok_or(ApiError::NotFound("announcement"))?;

    let signed_by = state.repo.approvers_display(id).await?;

    let attachment_url = match &announcement.attachment_key {
        Some(key) => Some(
            state
                .storage
                .get_presigned_download_url(key)
                .await
                .map_err(ApiError::Internal)?,
        ),
        None => None,
    };

    Ok(Json(AnnouncementDetail {
        announcement,
        signed_by,
        attachment_url,
    }))
}

// --- Authenticated Handlers ---

/// get_me
///
/// [Authenticated Route] The authenticated user's profile, with the live
/// signatory flag so the frontend can route to the review worklist.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    let is_active_signatory = state.repo.find_active_signatory(id).await?.is_some();

    Ok(Json(UserProfile {
        id: user.id,
        email: user.email,
        role: user.role,
        is_active_signatory,
    }))
}

/// get_my_announcements
///
/// [Authenticated Route] The author worklist: every announcement owned by the
/// requesting user, in every lifecycle state.
#[utoipa::path(
    get,
    path = "/me/announcements",
    responses((status = 200, description = "My announcements", body = [Announcement]))
)]
pub async fn get_my_announcements(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Announcement>>, ApiError> {
    Ok(Json(state.repo.list_by_author(id).await?))
}

/// get_pending_announcements
///
/// [Authenticated Route] The review worklist: everything currently awaiting
/// decisions, oldest first. Open to signatories and admins.
#[utoipa::path(
    get,
    path = "/announcements/pending",
    responses(
        (status = 200, description = "Pending announcements", body = [Announcement]),
        (status = 403, description = "Not a signatory")
    )
)]
pub async fn get_pending_announcements(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Announcement>>, ApiError> {
    if role == Role::Author {
        return Err(ApiError::Forbidden("view the review worklist"));
    }
    Ok(Json(state.repo.list_pending().await?))
}

/// create_announcement
///
/// [Authenticated Route] Drafts a new announcement owned by the caller. The
/// `author_id` is taken from the authenticated session, never the payload.
#[utoipa::path(
    post,
    path = "/announcements",
    request_body = CreateAnnouncementRequest,
    responses((status = 201, description = "Drafted", body = Announcement))
)]
pub async fn create_announcement(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAnnouncementRequest>,
) -> Result<(StatusCode, Json<Announcement>), ApiError> {
    let announcement = engine::create(&state.repo, &auth, payload).await?;
    Ok((StatusCode::CREATED, Json(announcement)))
}

/// update_announcement
///
/// [Authenticated Route] Partial edit of a draft. Content freezes at submit, so
/// anything past `draft` answers `invalid_state`.
#[utoipa::path(
    put,
    path = "/announcements/{id}",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    request_body = UpdateAnnouncementRequest,
    responses(
        (status = 200, description = "Updated", body = Announcement),
        (status = 409, description = "Not a draft")
    )
)]
pub async fn update_announcement(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAnnouncementRequest>,
) -> Result<Json<Announcement>, ApiError> {
    let announcement = engine::edit(&state.repo, &auth, id, payload).await?;
    Ok(Json(announcement))
}

/// submit_announcement
///
/// [Authenticated Route] Moves a draft into review, freezing the eligible
/// signatory set and quorum as of this moment.
#[utoipa::path(
    post,
    path = "/announcements/{id}/submit",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Submitted", body = Announcement),
        (status = 409, description = "Not a draft"),
        (status = 422, description = "No active signatories configured")
    )
)]
pub async fn submit_announcement(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Announcement>, ApiError> {
    let announcement = engine::submit(&state.repo, &auth, id).await?;
    Ok(Json(announcement))
}

/// approve_announcement
///
/// [Authenticated Route] Records an approval from an eligible, active signatory
/// and re-evaluates the quorum. A repeat decision overwrites the previous one.
#[utoipa::path(
    post,
    path = "/announcements/{id}/approve",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Decision recorded", body = Announcement),
        (status = 409, description = "No longer pending"),
        (status = 422, description = "Not active or not eligible")
    )
)]
pub async fn approve_announcement(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Announcement>, ApiError> {
    let announcement = engine::decide(&state.repo, &auth, id, Decision::Approve).await?;
    Ok(Json(announcement))
}

/// reject_announcement
///
/// [Authenticated Route] Records a rejection. One rejection is enough to sink an
/// announcement whose quorum requires everyone, since approval then becomes
/// mathematically impossible.
#[utoipa::path(
    post,
    path = "/announcements/{id}/reject",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Decision recorded", body = Announcement),
        (status = 409, description = "No longer pending"),
        (status = 422, description = "Not active or not eligible")
    )
)]
pub async fn reject_announcement(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Announcement>, ApiError> {
    let announcement = engine::decide(&state.repo, &auth, id, Decision::Reject).await?;
    Ok(Json(announcement))
}

/// retract_announcement
///
/// [Authenticated Route] Withdraws an announcement, recording the reason.
/// Possible from every non-terminal state; authors may withdraw their own
/// drafts, later states are admin-only. `retracted` is terminal.
#[utoipa::path(
    post,
    path = "/announcements/{id}/retract",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    request_body = RetractRequest,
    responses(
        (status = 200, description = "Retracted", body = Announcement),
        (status = 403, description = "Past the draft stage and not an admin"),
        (status = 409, description = "Already terminal")
    )
)]
pub async fn retract_announcement(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RetractRequest>,
) -> Result<Json<Announcement>, ApiError> {
    let announcement = engine::retract(&state.repo, &auth, id, payload.reason).await?;
    Ok(Json(announcement))
}

/// get_approval_progress
///
/// [Authenticated Route] The approval ledger read-out for one announcement:
/// counts against the frozen quorum plus every recorded decision. Readable by
/// the author, signatories and admins.
#[utoipa::path(
    get,
    path = "/announcements/{id}/approvals",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Ledger", body = ApprovalProgress),
        (status = 403, description = "Not yours and not a signatory")
    )
)]
pub async fn get_approval_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalProgress>, ApiError> {
    let progress = engine::approval_progress(&state.repo, &auth, id).await?;
    Ok(Json(progress))
}

/// get_signatory_roster
///
/// [Authenticated Route] The active signatory roster, shown alongside
/// announcements as the signing authority.
#[utoipa::path(
    get,
    path = "/signatories",
    responses((status = 200, description = "Active signatories", body = [Signatory]))
)]
pub async fn get_signatory_roster(
    AuthUser { .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Signatory>>, ApiError> {
    Ok(Json(state.repo.list_active_signatories().await?))
}

/// get_presigned_url
///
/// [Authenticated Route] Generates a temporary, secure URL for direct
/// client-to-cloud attachment upload.
///
/// *Security*: The URL is short-lived, constrained to the specified `file_type`,
/// and uses a unique object key, keeping heavy uploads off the application server.
#[utoipa::path(
    post,
    path = "/upload/presigned",
    request_body = PresignedUrlRequest,
    responses((status = 200, description = "URL", body = PresignedUrlResponse))
)]
pub async fn get_presigned_url(
    AuthUser { .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> Result<Json<PresignedUrlResponse>, ApiError> {
    // Generate a unique, structured object key (e.g., 'attachments/UUID.ext').
    let extension = std::path::Path::new(&payload.filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin");
    let object_key = format!("attachments/{}.{}", Uuid::new_v4(), extension);

    let upload_url = state
        .storage
        .get_presigned_upload_url(&object_key, &payload.file_type)
        .await
        .map_err(ApiError::Internal)?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key: object_key,
    }))
}

// --- Admin Handlers ---

/// get_admin_stats
///
/// [Admin Route] Core application statistics for the dashboard.
///
/// *Authorization*: Explicitly checks the role resolved by `AuthUser`, on top of
/// the admin route nesting.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn get_admin_stats(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>, ApiError> {
    if role != Role::Admin {
        return Err(ApiError::Forbidden("view admin statistics"));
    }
    Ok(Json(state.repo.get_stats().await?))
}

/// get_admin_announcements
///
/// [Admin Route] Every announcement in the system regardless of state,
/// optionally narrowed to one lifecycle state. Stale pending items are resolved
/// from here through decisions, never by forcing a transition.
#[utoipa::path(
    get,
    path = "/admin/announcements",
    params(AdminListQuery),
    responses((status = 200, description = "All announcements", body = AnnouncementPage))
)]
pub async fn get_admin_announcements(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<AdminListQuery>,
) -> Result<Json<AnnouncementPage>, ApiError> {
    if role != Role::Admin {
        return Err(ApiError::Forbidden("list all announcements"));
    }
    let (page, page_size) = normalize_paging(filter.page, filter.page_size);
    Ok(Json(
        state
            .repo
            .list_all_announcements(filter.state, page, page_size)
            .await?,
    ))
}

/// publish_announcement
///
/// [Admin Route] Publishes an approved announcement to the public feed,
/// stamping `published_at`.
#[utoipa::path(
    post,
    path = "/admin/announcements/{id}/publish",
    params(("id" = Uuid, Path, description = "Announcement ID")),
    responses(
        (status = 200, description = "Published", body = Announcement),
        (status = 409, description = "Not approved")
    )
)]
pub async fn publish_announcement(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Announcement>, ApiError> {
    let announcement = engine::publish(&state.repo, &auth, id).await?;
    Ok(Json(announcement))
}

/// add_signatory
///
/// [Admin Route] Registers a principal as a signatory and grants the role.
/// Fails with `duplicate_signatory` when an active record already exists.
#[utoipa::path(
    post,
    path = "/admin/signatories",
    request_body = AddSignatoryRequest,
    responses(
        (status = 201, description = "Registered", body = Signatory),
        (status = 409, description = "Already an active signatory")
    )
)]
pub async fn add_signatory(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<AddSignatoryRequest>,
) -> Result<(StatusCode, Json<Signatory>), ApiError> {
    if role != Role::Admin {
        return Err(ApiError::Forbidden("manage the signatory registry"));
    }
    let signatory = registry::register_signatory(&state.repo, payload).await?;
    Ok((StatusCode::CREATED, Json(signatory)))
}

/// remove_signatory
///
/// [Admin Route] Deactivates a signatory by principal identity. Idempotent on
/// repeat calls; `not_found` only for principals the registry has never seen.
/// Past decisions and pending quorum snapshots are untouched.
#[utoipa::path(
    delete,
    path = "/admin/signatories/{user_id}",
    params(("user_id" = Uuid, Path, description = "Principal identity")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 404, description = "Never registered")
    )
)]
pub async fn remove_signatory(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if role != Role::Admin {
        return Err(ApiError::Forbidden("manage the signatory registry"));
    }
    registry::remove_signatory(&state.repo, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_admin_signatories
///
/// [Admin Route] The full registry, deactivated history included.
#[utoipa::path(
    get,
    path = "/admin/signatories",
    responses((status = 200, description = "All signatory records", body = [Signatory]))
)]
pub async fn get_admin_signatories(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Signatory>>, ApiError> {
    if role != Role::Admin {
        return Err(ApiError::Forbidden("list the signatory registry"));
    }
    Ok(Json(state.repo.list_all_signatories().await?))
}

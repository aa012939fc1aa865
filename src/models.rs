use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The canonical identity record stored in the `public.profiles` table, mirroring
/// the external auth provider. This is the minimal data resolved during authentication.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    // Primary Key, also the Foreign Key to the external auth.users table.
    pub id: Uuid,
    // The user's primary identifier.
    pub email: String,
    // The RBAC field: 'author', 'signatory' or 'admin'.
    pub role: Role,
}

/// Role
///
/// Stored on the profile mirror as the `user_role` Postgres enum. `author` is the
/// registration default; `signatory` is granted through the registry; `admin` is
/// provisioned out of band.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    #[default]
    Author,
    Signatory,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Author => "author",
            Role::Signatory => "signatory",
            Role::Admin => "admin",
        }
    }
}

/// LifecycleState
///
/// The single state an announcement occupies at any moment, stored as the
/// `lifecycle_state` Postgres enum. Transition legality lives in `lifecycle.rs`;
/// this is only the data shape.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "lifecycle_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum LifecycleState {
    #[default]
    Draft,
    PendingApproval,
    Approved,
    Published,
    Rejected,
    Retracted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "draft",
            LifecycleState::PendingApproval => "pending_approval",
            LifecycleState::Approved => "approved",
            LifecycleState::Published => "published",
            LifecycleState::Rejected => "rejected",
            LifecycleState::Retracted => "retracted",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision
///
/// A signatory's current verdict on a pending announcement, stored as the
/// `decision_kind` Postgres enum. One row per (announcement, signatory); a repeat
/// decision overwrites the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type)]
#[sqlx(type_name = "decision_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

/// Signatory
///
/// A registry record from `public.signatories`. The principal identity is the
/// `user_id` (FK to profiles); at most one *active* record may exist per principal,
/// while deactivated history rows are kept for ledger display.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Signatory {
    pub id: Uuid,
    // The principal this record empowers.
    pub user_id: Uuid,
    pub name: String,
    // Office held, e.g. "General Secretary".
    pub title: String,
    pub contact: Option<String>,
    pub active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Announcement
///
/// The primary record from `public.announcements`. `quorum` and `eligible_count`
/// are snapshotted at submit time and never change afterwards; `version` guards
/// every write so concurrent transitions resolve to one winner.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Announcement {
    pub id: Uuid,
    // FK to public.profiles.id (Author).
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    pub category: String,
    // Academic session label, e.g. "2025/2026".
    pub session: String,

    // S3 key of the optional attachment, set via the presigned upload flow.
    pub attachment_key: Option<String>,

    pub state: LifecycleState,
    // Approvals required to pass, fixed at submit time. Zero while still a draft.
    pub quorum: i32,
    // Size of the eligible signatory set snapshotted at submit time.
    pub eligible_count: i32,
    // Optimistic guard; bumped on every state or content write.
    pub version: i32,

    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
    pub retraction_reason: Option<String>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Approval
///
/// A single ledger row from `public.approvals`. The composite key
/// (announcement_id, signatory_user_id) makes the last-write-wins upsert possible.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Approval {
    pub announcement_id: Uuid,
    pub signatory_user_id: Uuid,
    pub decision: Decision,
    #[ts(type = "string")]
    pub decided_at: DateTime<Utc>,
}

/// ApprovalView
///
/// A ledger row enriched with the signatory's display fields (a join operation),
/// shown on the approval-progress endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct ApprovalView {
    pub signatory_user_id: Uuid,
    pub name: String,
    pub title: String,
    pub decision: Decision,
    #[ts(type = "string")]
    pub decided_at: DateTime<Utc>,
}

/// ApprovalTally
///
/// Current counts over an announcement's ledger. SQL aggregates come back as
/// BIGINT, hence i64.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ApprovalTally {
    pub approve_count: i64,
    pub reject_count: i64,
}

impl ApprovalTally {
    pub fn total_decided(&self) -> i64 {
        self.approve_count + self.reject_count
    }
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for the public registration endpoint (POST /register).
/// Note: The password is only passed through to the external Auth provider and never
/// persisted or logged internally by this application. Registration always yields
/// the `author` role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
}

/// CreateAnnouncementRequest
///
/// Input payload for drafting a new announcement (POST /announcements).
/// The attachment key is provided after the client completes the direct-to-cloud upload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub body: String,
    pub category: String,
    pub session: String,
    // S3 Key resulting from the presigned upload flow.
    pub attachment_key: Option<String>,
}

/// UpdateAnnouncementRequest
///
/// Partial update payload for editing a draft (PUT /announcements/{id}).
///
/// Uses `Option<T>` for all fields and `#[serde(skip_serializing_if = "Option::is_none")]`
/// so only the provided fields travel in the JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAnnouncementRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_key: Option<String>,
}

/// RetractRequest
///
/// Input payload for retracting a published announcement; the reason is recorded
/// on the row and visible to the author and admins.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RetractRequest {
    pub reason: String,
}

/// AddSignatoryRequest
///
/// Admin payload for registering a signatory (POST /admin/signatories).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AddSignatoryRequest {
    // Principal identity; must refer to an existing profile.
    pub user_id: Uuid,
    pub name: String,
    pub title: String,
    pub contact: Option<String>,
}

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived S3 upload URL (POST /upload/presigned).
/// The server uses these fields to set security constraints on the generated URL.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "poster.png")]
    pub filename: String,
    /// The MIME type, used to constrain the S3 upload to the allowed type (security).
    #[schema(example = "image/png")]
    pub file_type: String,
}

/// PresignedUrlResponse
///
/// Output schema containing the secure, temporary URL for client-to-cloud file transfer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The S3 object key where the file will be stored (referenced as `attachment_key`).
    pub resource_key: String,
}

// --- Response Schemas (Output) ---

/// AnnouncementPage
///
/// A page of the feed plus the total match count, so clients can render pagers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AnnouncementPage {
    pub items: Vec<Announcement>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// SignerDisplay
///
/// Name and office of a signatory who approved a published announcement, shown on
/// the public detail view.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SignerDisplay {
    pub name: String,
    pub title: String,
}

/// AnnouncementDetail
///
/// Public detail view of a published announcement: the record, the signatories who
/// approved it, and a short-lived download URL for the attachment when present.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AnnouncementDetail {
    pub announcement: Announcement,
    pub signed_by: Vec<SignerDisplay>,
    pub attachment_url: Option<String>,
}

/// ApprovalProgress
///
/// The ledger read-out for one announcement: counts against the snapshotted quorum
/// plus every recorded decision.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ApprovalProgress {
    pub announcement_id: Uuid,
    pub state: LifecycleState,
    pub quorum: i32,
    pub eligible_count: i32,
    pub approve_count: i64,
    pub reject_count: i64,
    pub decisions: Vec<ApprovalView>,
}

/// AdminDashboardStats
///
/// Output schema for the administrative statistics dashboard (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_announcements: i64,
    pub draft: i64,
    pub pending_approval: i64,
    pub approved: i64,
    pub published: i64,
    pub rejected: i64,
    pub retracted: i64,
    pub active_signatories: i64,
    pub total_signatories: i64,
}

/// UserProfile
///
/// Output schema for the authenticated user's profile (GET /me). Carries the
/// signatory flag so the frontend can route to the review worklist.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    /// True when the user currently holds an active registry record.
    pub is_active_signatory: bool,
}

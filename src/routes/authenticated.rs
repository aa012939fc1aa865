use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Defines the routes accessible to any user who has successfully passed the
/// authentication layer. This module implements the full announcement lifecycle
/// for authors (draft, edit, submit, retract), the decision endpoints for
/// signatories, the approval-ledger read-out, and media upload.
///
/// Access Control Strategy:
/// Every handler in this module relies on the `AuthUser` extractor middleware being
/// present on the router layer above this module. This guarantees that all handlers
/// receive a validated `AuthUser` struct containing the user's ID and role. Action
/// permissions on top of that (ownership for edit/submit/retract, the signatory
/// role for decisions) are evaluated by the lifecycle engine against the policy
/// table, after the state check.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /upload/presigned
        // Initiates the secure media upload pipeline. Generates a short-lived (10-minute)
        // presigned S3 URL which allows the client to upload poster/PDF content
        // directly to the storage service (S3/MinIO), bypassing the application server.
        .route("/upload/presigned", post(handlers::get_presigned_url))
        // GET /me
        // Retrieves the currently authenticated user's profile, including whether the
        // user currently holds an active signatory seat.
        .route("/me", get(handlers::get_me))
        // GET /me/announcements
        // Lists every announcement owned by the authenticated user, in every lifecycle
        // state, drafts and rejections included.
        .route("/me/announcements", get(handlers::get_my_announcements))
        // --- Lifecycle: author actions ---
        // POST /announcements
        // Drafts a new announcement. The owner is always the authenticated caller.
        .route("/announcements", post(handlers::create_announcement))
        // GET /announcements/pending
        // The review worklist for signatories and admins, oldest submission first.
        // Registered before the public `{id}` capture; the static segment wins.
        .route(
            "/announcements/pending",
            get(handlers::get_pending_announcements),
        )
        // PUT /announcements/{id}
        // Partial edit of the caller's own draft. Content freezes at submission,
        // so edits outside 'draft' answer 409 invalid_state.
        .route("/announcements/{id}", put(handlers::update_announcement))
        // POST /announcements/{id}/submit
        // Moves a draft into review. The eligible signatory set and the quorum are
        // frozen at this instant; later roster changes do not touch them.
        .route(
            "/announcements/{id}/submit",
            post(handlers::submit_announcement),
        )
        // POST /announcements/{id}/retract
        // Withdraws an announcement, recording the reason. Possible from every
        // non-terminal state: authors may withdraw their own drafts, anything
        // past submission comes down admin-only. 'retracted' is terminal.
        .route(
            "/announcements/{id}/retract",
            post(handlers::retract_announcement),
        )
        // --- Approval Ledger: signatory actions ---
        // POST /announcements/{id}/approve
        // POST /announcements/{id}/reject
        // Records a decision from an eligible, active signatory. Last write wins when
        // a signatory changes their mind; quorum is re-evaluated after every write.
        .route(
            "/announcements/{id}/approve",
            post(handlers::approve_announcement),
        )
        .route(
            "/announcements/{id}/reject",
            post(handlers::reject_announcement),
        )
        // GET /announcements/{id}/approvals
        // The ledger read-out: approve/reject counts against the frozen quorum, plus
        // each recorded decision. Visible to the author, signatories and admins.
        .route(
            "/announcements/{id}/approvals",
            get(handlers::get_approval_progress),
        )
        // GET /signatories
        // The active roster, displayed as the signing authority for announcements.
        .route("/signatories", get(handlers::get_signatory_roster))
}

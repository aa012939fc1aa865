use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Admin Router Module
///
/// Defines the routes exclusively accessible to users with the 'admin' role.
/// These endpoints cover publication, registry management, and statistical
/// oversight.
///
/// Access Control:
/// This entire router is nested under '/admin' and sits behind the authentication
/// layer applied in `create_router`. On top of that, every handler explicitly
/// checks for the `role = 'admin'` permission before proceeding, so a routing
/// mistake alone can never expose these functions.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/stats
        // Retrieves core dashboard metrics (totals per lifecycle state plus
        // registry size). Essential for oversight of the review pipeline.
        .route("/stats", get(handlers::get_admin_stats))
        // GET /admin/announcements?state=...
        // Lists ALL announcements in the system regardless of state, optionally
        // narrowed to one lifecycle state. Used for queue management; a stale
        // pending item is unblocked from here by chasing decisions, never by
        // forcing a transition.
        .route("/announcements", get(handlers::get_admin_announcements))
        // POST /admin/announcements/{id}/publish
        // Publishes an approved announcement to the public feed and stamps
        // `published_at`. Publication is deliberately admin-only; authors cannot
        // push their own approved items live.
        .route(
            "/announcements/{id}/publish",
            post(handlers::publish_announcement),
        )
        // GET /admin/signatories
        // The full registry, deactivated records included, for audit.
        // POST /admin/signatories
        // Registers a principal as a signatory (granting the role if needed).
        .route(
            "/signatories",
            get(handlers::get_admin_signatories).post(handlers::add_signatory),
        )
        // DELETE /admin/signatories/{user_id}
        // Deactivates a signatory by principal identity. Idempotent; past decisions
        // and already-frozen quorum snapshots are left untouched.
        .route(
            "/signatories/{user_id}",
            delete(handlers::remove_signatory),
        )
}

use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any client
/// (anonymous or logged-in). These routes primarily handle read-only access to
/// the published feed, and core gateway functions like registration.
///
/// Security Mandate:
/// All data retrieval handlers in this module (i.e., `/announcements/*`) must
/// enforce `state = 'published'` at the Repository level. This prevents anonymous
/// or unauthorized viewing of drafts, items pending review, rejected items, or
/// anything taken down by retraction.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load balancer checks.
        // Returns "ok" immediately to verify the service is running and responsive.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Endpoint for new user creation and initial profile setup. This is part of the
        // identity flow managed by Supabase/Auth in production. Every self-registered
        // account starts as an 'author'; elevated roles are granted elsewhere.
        .route("/register", post(handlers::register_user))
        // GET /announcements?category=...&session=...&search=...
        // The public feed: published announcements newest first, with category/session
        // filters and title search. Critical enforcement of `state = 'published'`
        // occurs in the handler's Repository query.
        .route("/announcements", get(handlers::get_announcements))
        // GET /announcements/{id}
        // Retrieves the detailed view of a single published announcement, with the
        // names of the signatories who approved it and a short-lived attachment URL.
        // Anything not published answers 404 here, never 403, so existence of
        // unpublished drafts is not revealed.
        .route("/announcements/{id}", get(handlers::get_announcement_details))
}

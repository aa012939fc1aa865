use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::models::LifecycleState;

/// ApiError
///
/// The closed error taxonomy for every endpoint. Handlers and engines return this
/// type; the `IntoResponse` impl turns it into the canonical JSON error body
/// `{ "error": <code>, "message": <text> }` so clients can branch on `error`
/// without parsing prose.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, expired or unverifiable credentials.
    #[error("authentication required")]
    Unauthenticated,

    /// The current state permits the action, but not for this caller.
    #[error("not permitted to {0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The lifecycle table has no such transition from the current state.
    /// `allowed` lists the actions that remain (empty for terminal states).
    #[error("not allowed in state '{state}'; allowed next actions: [{allowed}]")]
    InvalidState {
        state: LifecycleState,
        allowed: String,
    },

    /// Decisions are only accepted while an announcement is pending approval.
    #[error("decisions are only accepted while pending approval; announcement is '{0}'")]
    AnnouncementNotPending(LifecycleState),

    #[error("an active signatory record already exists for this user")]
    DuplicateSignatory,

    /// The caller is not in this announcement's eligible set, or their registry
    /// record has been deactivated since.
    #[error("signatory is not active or not eligible for this announcement")]
    SignatoryInactive,

    /// Submit requires at least one active signatory to form a quorum.
    #[error("no active signatories are configured")]
    NoSignatoriesConfigured,

    /// A concurrent write won the version guard twice in a row. Retryable.
    #[error("the announcement was modified concurrently, please retry")]
    Conflict,

    /// The external auth provider rejected a signup (email taken, weak password).
    #[error("registration failed: {0}")]
    Registration(String),

    #[error("internal storage error")]
    Database(#[from] sqlx::Error),

    /// Object storage or provider-call failure; detail goes to the log, not the client.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code, independent of the human message.
    pub const fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidState { .. } => "invalid_state",
            ApiError::AnnouncementNotPending(_) => "announcement_not_pending",
            ApiError::DuplicateSignatory => "duplicate_signatory",
            ApiError::SignatoryInactive => "signatory_inactive",
            ApiError::NoSignatoriesConfigured => "no_signatories_configured",
            ApiError::Conflict => "conflict",
            ApiError::Registration(_) => "registration_failed",
            ApiError::Database(_) => "internal",
            ApiError::Internal(_) => "internal",
        }
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidState { .. } => StatusCode::CONFLICT,
            ApiError::AnnouncementNotPending(_) => StatusCode::CONFLICT,
            ApiError::DuplicateSignatory => StatusCode::CONFLICT,
            ApiError::SignatoryInactive => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NoSignatoriesConfigured => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Registration(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Storage faults get logged here with detail; the client only sees the
        // generic message.
        match &self {
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error surfaced to client");
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "internal error surfaced to client");
            }
            _ => {}
        }

        let status = self.status_code();
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

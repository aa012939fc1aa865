use crate::error::ApiError;
use crate::models::{AddSignatoryRequest, Role, Signatory};
use crate::repository::RepositoryState;
use uuid::Uuid;

/// register_signatory
///
/// Admin operation: empowers a principal as a signatory. At most one active
/// record may exist per principal; re-registering a previously deactivated
/// principal creates a fresh record rather than resurrecting the old one, so
/// registry history stays append-only.
///
/// Granting the record also grants the `signatory` role, unless the principal
/// already holds `admin`. Deactivation never takes the role back; the live
/// `active` flag is what gates decisions.
pub async fn register_signatory(
    repo: &RepositoryState,
    req: AddSignatoryRequest,
) -> Result<Signatory, ApiError> {
    let Some(user) = repo.get_user(req.user_id).await? else {
        return Err(ApiError::NotFound("user"));
    };
    if repo.find_active_signatory(req.user_id).await?.is_some() {
        return Err(ApiError::DuplicateSignatory);
    }

    let signatory = repo.create_signatory(req).await?;
    if user.role == Role::Author {
        repo.set_user_role(user.id, Role::Signatory).await?;
    }

    tracing::info!(user_id = %signatory.user_id, name = %signatory.name, "signatory registered");
    Ok(signatory)
}

/// remove_signatory
///
/// Admin operation: deactivates the principal's active record. Idempotent: a
/// principal who is already inactive is a quiet success; only a principal the
/// registry has never seen is `not_found`. History rows are kept so past ledger
/// entries keep resolving to a display name.
pub async fn remove_signatory(repo: &RepositoryState, user_id: Uuid) -> Result<(), ApiError> {
    if repo.deactivate_signatory(user_id).await? {
        tracing::info!(%user_id, "signatory deactivated");
        return Ok(());
    }
    if repo.signatory_exists(user_id).await? {
        // Already inactive; repeat deactivation is a no-op.
        return Ok(());
    }
    Err(ApiError::NotFound("signatory"))
}

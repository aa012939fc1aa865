use std::time::Duration;

use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{self, QuorumOutcome};
use crate::lifecycle::{self, Action};
use crate::models::{
    Announcement, ApprovalProgress, CreateAnnouncementRequest, Decision, LifecycleState, Role,
    UpdateAnnouncementRequest,
};
use crate::policy;
use crate::repository::RepositoryState;

// A writer that loses the version guard backs off this long, re-reads and
// retries once before reporting the conflict to the caller.
const CONFLICT_BACKOFF: Duration = Duration::from_millis(25);

fn invalid_state(state: LifecycleState) -> ApiError {
    ApiError::InvalidState {
        state,
        allowed: state.allowed_actions().join(", "),
    }
}

async fn load(repo: &RepositoryState, id: Uuid) -> Result<Announcement, ApiError> {
    repo.get_announcement(id)
        .await?
        .ok_or(ApiError::NotFound("announcement"))
}

/// check
///
/// Possibility before permission: when the current state does not admit the
/// action, the caller gets the state error even if they would also be denied,
/// so error codes do not depend on who asks. `forbidden` strictly means "the
/// state allows it, but not for you".
fn check(auth: &AuthUser, a: &Announcement, action: Action) -> Result<(), ApiError> {
    if !lifecycle::permits(a.state, action) {
        return Err(match action {
            Action::Decide => ApiError::AnnouncementNotPending(a.state),
            _ => invalid_state(a.state),
        });
    }
    if !policy::can_perform(auth.role, a.author_id == auth.id, action, a.state) {
        return Err(ApiError::Forbidden(action.as_str()));
    }
    Ok(())
}

/// create
///
/// Drafts a new announcement owned by the caller. There is no subject row yet,
/// so only the policy table is consulted; the draft state it would be born
/// into stands in.
pub async fn create(
    repo: &RepositoryState,
    auth: &AuthUser,
    req: CreateAnnouncementRequest,
) -> Result<Announcement, ApiError> {
    if !policy::can_perform(auth.role, false, Action::Create, LifecycleState::Draft) {
        return Err(ApiError::Forbidden(Action::Create.as_str()));
    }
    let a = repo.create_announcement(req, auth.id).await?;
    tracing::info!(announcement_id = %a.id, author_id = %auth.id, "announcement drafted");
    Ok(a)
}

/// edit
///
/// Partial content update, drafts only. Content freezes once submitted so
/// signatories decide on exactly what they read.
pub async fn edit(
    repo: &RepositoryState,
    auth: &AuthUser,
    id: Uuid,
    req: UpdateAnnouncementRequest,
) -> Result<Announcement, ApiError> {
    let a = load(repo, id).await?;
    check(auth, &a, Action::Edit)?;

    if let Some(updated) = repo
        .update_announcement_content(id, a.version, req.clone())
        .await?
    {
        return Ok(updated);
    }

    // Lost the version guard; re-read and retry once.
    tokio::time::sleep(CONFLICT_BACKOFF).await;
    let a = load(repo, id).await?;
    check(auth, &a, Action::Edit)?;
    match repo.update_announcement_content(id, a.version, req).await? {
        Some(updated) => Ok(updated),
        None => Err(ApiError::Conflict),
    }
}

/// submit
///
/// Moves a draft into review. The active roster is snapshotted here: the
/// eligible set and the quorum (everyone active now, floor one) are frozen for
/// the life of the announcement, so later registry changes never move the bar.
pub async fn submit(
    repo: &RepositoryState,
    auth: &AuthUser,
    id: Uuid,
) -> Result<Announcement, ApiError> {
    let mut a = load(repo, id).await?;
    check(auth, &a, Action::Submit)?;

    let mut attempts = 0;
    loop {
        // The roster is re-read on retry so a lost race never submits against a
        // stale eligible set.
        let roster = repo.list_active_signatories().await?;
        if roster.is_empty() {
            return Err(ApiError::NoSignatoriesConfigured);
        }
        let eligible: Vec<Uuid> = roster.iter().map(|s| s.user_id).collect();
        let quorum = ledger::quorum_for(eligible.len());

        if let Some(submitted) = repo
            .submit_announcement(id, a.version, &eligible, quorum)
            .await?
        {
            tracing::info!(
                announcement_id = %id,
                quorum,
                eligible = eligible.len(),
                "announcement submitted for approval"
            );
            return Ok(submitted);
        }

        attempts += 1;
        if attempts == 2 {
            return Err(ApiError::Conflict);
        }
        tokio::time::sleep(CONFLICT_BACKOFF).await;
        a = load(repo, id).await?;
        if a.state == LifecycleState::PendingApproval {
            // A concurrent submit won; the intent is already fulfilled.
            return Ok(a);
        }
        check(auth, &a, Action::Submit)?;
    }
}

/// decide
///
/// Records a signatory's verdict and re-evaluates the quorum. The ledger row
/// always lands (last write wins); the state transition, if the tally reached
/// an outcome, is applied under the version guard so a race between two
/// deciders resolves to exactly one winner. A decider whose outcome was applied
/// by the competitor absorbs the loss as success.
pub async fn decide(
    repo: &RepositoryState,
    auth: &AuthUser,
    id: Uuid,
    decision: Decision,
) -> Result<Announcement, ApiError> {
    let a = load(repo, id).await?;
    check(auth, &a, Action::Decide)?;

    // Both the live registry flag and the frozen eligible set must admit the
    // caller. Deactivation silences a signatory immediately, even though the
    // snapshot keeps counting them toward the quorum arithmetic.
    if repo.find_active_signatory(auth.id).await?.is_none() {
        return Err(ApiError::SignatoryInactive);
    }
    if !repo.is_eligible(id, auth.id).await? {
        return Err(ApiError::SignatoryInactive);
    }

    repo.upsert_approval(id, auth.id, decision).await?;
    tracing::info!(
        announcement_id = %id,
        signatory = %auth.id,
        decision = decision.as_str(),
        "decision recorded"
    );

    let mut current = load(repo, id).await?;
    let mut attempts = 0;
    loop {
        if current.state != LifecycleState::PendingApproval {
            // Another decider already applied the outcome; ours is on the ledger.
            return Ok(current);
        }
        let tally = repo.count_decisions(id).await?;
        let target = match ledger::evaluate(&tally, current.quorum, current.eligible_count) {
            QuorumOutcome::Pending => return Ok(current),
            QuorumOutcome::Approved => LifecycleState::Approved,
            QuorumOutcome::Rejected => LifecycleState::Rejected,
        };

        if let Some(moved) = repo
            .transition_state(id, current.version, LifecycleState::PendingApproval, target)
            .await?
        {
            tracing::info!(announcement_id = %id, outcome = %moved.state, "quorum outcome applied");
            return Ok(moved);
        }

        attempts += 1;
        if attempts == 2 {
            return Err(ApiError::Conflict);
        }
        tokio::time::sleep(CONFLICT_BACKOFF).await;
        current = load(repo, id).await?;
    }
}

/// publish
///
/// Admin action, approved announcements only. Stamps `published_at` and opens
/// the announcement to the public feed. A concurrent publish that already won
/// is absorbed as success.
pub async fn publish(
    repo: &RepositoryState,
    auth: &AuthUser,
    id: Uuid,
) -> Result<Announcement, ApiError> {
    let mut a = load(repo, id).await?;
    check(auth, &a, Action::Publish)?;

    let mut attempts = 0;
    loop {
        if let Some(published) = repo.publish_announcement(id, a.version).await? {
            tracing::info!(announcement_id = %id, "announcement published");
            return Ok(published);
        }
        attempts += 1;
        if attempts == 2 {
            return Err(ApiError::Conflict);
        }
        tokio::time::sleep(CONFLICT_BACKOFF).await;
        a = load(repo, id).await?;
        if a.state == LifecycleState::Published {
            return Ok(a);
        }
        check(auth, &a, Action::Publish)?;
    }
}

/// retract
///
/// Withdraws an announcement for good, recording the reason. Possible from
/// every non-terminal state: authors may withdraw their own drafts, everything
/// past submission is taken down by admins. `retracted` is terminal; a
/// published announcement disappears from the feed but keeps its record.
pub async fn retract(
    repo: &RepositoryState,
    auth: &AuthUser,
    id: Uuid,
    reason: String,
) -> Result<Announcement, ApiError> {
    let mut a = load(repo, id).await?;
    check(auth, &a, Action::Retract)?;

    let mut attempts = 0;
    loop {
        if let Some(retracted) = repo
            .retract_announcement(id, a.version, a.state, reason.clone())
            .await?
        {
            tracing::info!(announcement_id = %id, from = %a.state, "announcement retracted");
            return Ok(retracted);
        }
        attempts += 1;
        if attempts == 2 {
            return Err(ApiError::Conflict);
        }
        tokio::time::sleep(CONFLICT_BACKOFF).await;
        a = load(repo, id).await?;
        if a.state == LifecycleState::Retracted {
            // A concurrent retract won; theirs carries the recorded reason.
            return Ok(a);
        }
        check(auth, &a, Action::Retract)?;
    }
}

/// approval_progress
///
/// The ledger read-out: counts against the frozen quorum plus every recorded
/// decision. Readable by the announcement's author, by signatories and by
/// admins; plain members only ever see the `signed_by` roster on the public
/// detail view.
pub async fn approval_progress(
    repo: &RepositoryState,
    auth: &AuthUser,
    id: Uuid,
) -> Result<ApprovalProgress, ApiError> {
    let a = load(repo, id).await?;
    if a.author_id != auth.id && auth.role == Role::Author {
        return Err(ApiError::Forbidden("view this approval ledger"));
    }

    let tally = repo.count_decisions(id).await?;
    let decisions = repo.list_approvals(id).await?;
    Ok(ApprovalProgress {
        announcement_id: a.id,
        state: a.state,
        quorum: a.quorum,
        eligible_count: a.eligible_count,
        approve_count: tally.approve_count,
        reject_count: tally.reject_count,
        decisions,
    })
}

use crate::lifecycle::Action;
use crate::models::{LifecycleState, Role};

/// can_perform
///
/// The authorization table, pure and total: given the caller's role, whether
/// they authored the announcement in question, the action, and the lifecycle
/// state it would act on, answer yes or no with no I/O. State *legality* is
/// not decided here; engines check possibility (`lifecycle::permits`) first,
/// so this function only ever answers "the state allows it, but may you". The
/// state matters to exactly one row: how far along an announcement is decides
/// who may still withdraw it.
///
/// Admins pass every row of the table. That does not let them out of the state
/// machine: a terminal announcement refuses transitions before this table is
/// consulted.
///
/// Read visibility is not a row here either; it is enforced structurally by the
/// scoped repository queries each endpoint uses (the public feed only ever
/// selects `published`, the worklists are filtered per caller).
pub fn can_perform(role: Role, is_author: bool, action: Action, state: LifecycleState) -> bool {
    if role == Role::Admin {
        return true;
    }
    match action {
        // Any authenticated member may draft an announcement.
        Action::Create => true,
        // Content and submission stay with the author.
        Action::Edit | Action::Submit => is_author,
        // Role admits a principal to the decision endpoints; whether a specific
        // decision lands is the registry's call (active flag + eligible set).
        Action::Decide => role == Role::Signatory,
        Action::Publish => false,
        // Authors may withdraw their own unsubmitted draft; once review starts
        // or the item goes live, taking it down is an admin action.
        Action::Retract => is_author && state == LifecycleState::Draft,
    }
}

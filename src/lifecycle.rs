use crate::models::LifecycleState;

/// Action
///
/// Every verb a caller can aim at an announcement. `permits` below is the
/// single source of truth for which states admit each action; the policy
/// module answers *who* may perform it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Edit,
    Submit,
    /// Approve or reject while pending. The resulting transition (if any) is
    /// driven by the quorum evaluation, not by the action itself.
    Decide,
    Publish,
    Retract,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Submit => "submit",
            Action::Decide => "decide",
            Action::Publish => "publish",
            Action::Retract => "retract",
        }
    }
}

impl LifecycleState {
    /// Terminal states accept no further transitions, for any caller.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Rejected | LifecycleState::Retracted)
    }

    /// The caller-visible actions still open from this state, used verbatim in
    /// `invalid_state` error messages. Terminal states return an empty slice.
    pub fn allowed_actions(&self) -> &'static [&'static str] {
        match self {
            LifecycleState::Draft => &["edit", "submit", "retract"],
            LifecycleState::PendingApproval => &["approve", "reject", "retract"],
            LifecycleState::Approved => &["publish", "retract"],
            LifecycleState::Published => &["retract"],
            LifecycleState::Rejected | LifecycleState::Retracted => &[],
        }
    }
}

/// True when `action` is possible while the announcement sits in `state`.
/// Possibility is checked before permission everywhere, so a caller who could
/// never perform the action still learns the real reason it cannot happen.
///
/// Retraction is the one action open to more than a single state: an
/// announcement can be withdrawn at any point until it reaches a terminal
/// state. Everything else has exactly one home.
pub fn permits(state: LifecycleState, action: Action) -> bool {
    match action {
        Action::Create => true,
        Action::Edit | Action::Submit => state == LifecycleState::Draft,
        Action::Decide => state == LifecycleState::PendingApproval,
        Action::Publish => state == LifecycleState::Approved,
        Action::Retract => !state.is_terminal(),
    }
}

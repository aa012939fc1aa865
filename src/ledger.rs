use crate::models::ApprovalTally;

/// QuorumOutcome
///
/// The verdict of re-evaluating an announcement's ledger after a decision lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumOutcome {
    Approved,
    Rejected,
    Pending,
}

/// The quorum fixed at submit time: every signatory active at that moment must
/// approve, with a floor of one.
pub fn quorum_for(eligible_count: usize) -> i32 {
    (eligible_count.max(1)) as i32
}

/// evaluate
///
/// Applies the threshold rules to the current tally, against the quorum and
/// eligible-set size snapshotted at submit time:
///
/// - enough approvals reach the quorum outright;
/// - a rejection count that exceeds the slack (`eligible - quorum`) means even
///   unanimous approval of everyone undecided can no longer reach the quorum,
///   so the announcement is rejected rather than left to wait forever;
/// - otherwise the announcement keeps waiting for decisions.
///
/// The tally already reflects last-write-wins, so an overwritten decision never
/// counts twice.
pub fn evaluate(tally: &ApprovalTally, quorum: i32, eligible_count: i32) -> QuorumOutcome {
    if tally.approve_count >= i64::from(quorum) {
        return QuorumOutcome::Approved;
    }
    if tally.reject_count > i64::from(eligible_count - quorum) {
        return QuorumOutcome::Rejected;
    }
    QuorumOutcome::Pending
}

//! Pure state transition function.
//!
//! Given an item's current [`FeedTypeSet`] and a notification (the feed it
//! arrived on plus an optional deletion reason), compute the next set. The
//! function has no side effects; callers decide what to log or persist.
//!
//! Rules:
//! - **shared**: add `shared`, drop `deleted` and its reason.
//! - **selected**: refused unless already shared; otherwise add `selected`.
//! - **deleted**: refused unless already shared. A `selected` reason demotes
//!   the item out of the selected view, a `featured` reason collapses the set
//!   to `{deleted}`, any other reason adds `deleted` next to existing states.

use super::feed_type::{DeletionReason, FeedType, FeedTypeSet};

/// Why a notification was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A `selected` notification for an item that was never shared.
    SelectUnshared,
    /// A `deleted` notification for an item that was never shared.
    DeleteUnshared,
}

impl RejectReason {
    pub fn describe(self) -> &'static str {
        match self {
            RejectReason::SelectUnshared => "tried to select unshared item",
            RejectReason::DeleteUnshared => "tried to delete unshared item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
    Rejected(RejectReason),
}

/// Result of a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The set after the transition (equal to the input when rejected).
    pub state: FeedTypeSet,
    pub outcome: Outcome,
}

impl TransitionResult {
    fn rejected(state: FeedTypeSet, reason: RejectReason) -> Self {
        Self {
            state,
            outcome: Outcome::Rejected(reason),
        }
    }

    fn compare(before: &FeedTypeSet, state: FeedTypeSet) -> Self {
        let outcome = if *before == state {
            Outcome::Unchanged
        } else {
            Outcome::Changed
        };
        Self { state, outcome }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, Outcome::Rejected(_))
    }
}

/// Compute the next feed-type set for a notification from `origin`.
///
/// `reason` is only consulted for `deleted` notifications; `None` there is
/// recorded as [`DeletionReason::Unspecified`].
pub fn apply(
    current: &FeedTypeSet,
    origin: FeedType,
    reason: Option<&DeletionReason>,
) -> TransitionResult {
    match origin {
        FeedType::Shared => {
            let mut next = current.clone();
            next.set_shared(true);
            next.clear_deletion();
            TransitionResult::compare(current, next)
        }
        FeedType::Selected => {
            if !current.is_shared() {
                return TransitionResult::rejected(current.clone(), RejectReason::SelectUnshared);
            }
            let mut next = current.clone();
            next.set_selected(true);
            TransitionResult::compare(current, next)
        }
        FeedType::Deleted => {
            if !current.is_shared() {
                return TransitionResult::rejected(current.clone(), RejectReason::DeleteUnshared);
            }
            let reason = reason.cloned().unwrap_or(DeletionReason::Unspecified);
            let next = match reason {
                DeletionReason::Selected => {
                    let mut next = current.clone();
                    next.set_selected(false);
                    next.mark_deleted(DeletionReason::Selected);
                    next
                }
                DeletionReason::Featured => {
                    FeedTypeSet::from_parts(false, false, Some(DeletionReason::Featured))
                }
                // Other reasons leave `selected` in place; whether they should
                // also demote the item is still open with product.
                other => {
                    let mut next = current.clone();
                    next.mark_deleted(other);
                    next
                }
            };
            TransitionResult::compare(current, next)
        }
    }
}

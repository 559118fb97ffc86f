// ABOUTME: Completion policy - strictness and the pure dispatch decision.
// ABOUTME: decide() looks only at the operation set and the gating flags.

use serde::{Deserialize, Serialize};

use super::state::OperationSet;

/// Which mix of outcomes triggers the continuation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Any rejection fires the continuation at once with the rejected set.
    Strict,
    /// Wait for every operation; prefer the resolved set when there is one.
    #[default]
    Lax,
}

/// What a re-evaluation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not armed; nothing is checked.
    Disarmed,
    /// Operations are still pending.
    Waiting,
    /// Fire the continuation with the resolved set.
    Resolved,
    /// Fire the continuation with the rejected set.
    Rejected,
    /// Nothing pending and nothing settled. No dispatch.
    Idle,
}

impl Dispatch {
    pub fn fires(self) -> bool {
        matches!(self, Dispatch::Resolved | Dispatch::Rejected)
    }
}

/// Decide whether the continuation should fire and with which results.
///
/// Strict checks rejected, then pending, then resolved. Lax checks pending,
/// then resolved, then rejected; a mix of resolved and rejected under lax
/// therefore dispatches the resolved set only.
pub fn decide<P>(set: &OperationSet<P>, armed: bool, strictness: Strictness) -> Dispatch {
    if !armed {
        return Dispatch::Disarmed;
    }

    match strictness {
        Strictness::Strict => {
            if set.has_rejected() {
                Dispatch::Rejected
            } else if set.has_pending() {
                Dispatch::Waiting
            } else if set.has_resolved() {
                Dispatch::Resolved
            } else {
                Dispatch::Idle
            }
        }
        Strictness::Lax => {
            if set.has_pending() {
                Dispatch::Waiting
            } else if set.has_resolved() {
                Dispatch::Resolved
            } else if set.has_rejected() {
                Dispatch::Rejected
            } else {
                Dispatch::Idle
            }
        }
    }
}

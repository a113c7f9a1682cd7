//! Duplicate-work detection over a snapshot of open proposals.
//!
//! The snapshot can be stale by the time a proposal is created. Two runs
//! against the same revision can both see "no duplicate"; the loser's push or
//! proposal creation then fails and is reported. The caller's scheduler is
//! expected to serialize runs.

use crate::core::types::OpenProposal;

/// Return the first open proposal whose head branch is `branch`.
pub fn find_existing<'a>(open: &'a [OpenProposal], branch: &str) -> Option<&'a OpenProposal> {
    open.iter().find(|proposal| proposal.head_branch == branch)
}

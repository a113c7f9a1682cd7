//! Revision planning: deterministic, revision-bound proposal branch names.

use crate::core::types::{RepositoryMetadata, RevisionPlan};

/// Derive the proposal branch for a head commit.
///
/// The name is `prefix + commit`, so the same commit always maps to the same
/// branch and two distinct commits never share one.
pub fn proposal_branch_name(prefix: &str, head_commit: &str) -> String {
    format!("{prefix}{head_commit}")
}

/// Assemble the plan from repository metadata and the resolved head commit.
pub fn build_plan(prefix: &str, metadata: RepositoryMetadata, head_commit: String) -> RevisionPlan {
    let proposal_branch = proposal_branch_name(prefix, &head_commit);
    RevisionPlan {
        default_branch: metadata.default_branch,
        head_commit,
        proposal_branch,
        clone_url: metadata.clone_url,
    }
}

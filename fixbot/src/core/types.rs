//! Shared deterministic types for the fixbot pipeline.
//!
//! These types describe the stable contracts between stages. They carry no
//! I/O handles and are never mutated after construction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Target repository, supplied by the environment and never derived.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity {
    pub owner: String,
    pub name: String,
}

impl RepositoryIdentity {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Repository metadata returned by the hosted API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryMetadata {
    pub default_branch: String,
    pub clone_url: String,
}

/// Everything the later stages need to know about the revision being fixed.
///
/// Built once by the revision planner. `proposal_branch` is a pure function
/// of `head_commit` (see [`crate::core::plan::proposal_branch_name`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionPlan {
    pub default_branch: String,
    pub head_commit: String,
    pub proposal_branch: String,
    pub clone_url: String,
}

/// One open change proposal targeting the default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenProposal {
    pub number: u64,
    pub head_branch: String,
}

/// Payload for opening a change proposal.
///
/// Only constructed when the working copy is dirty, and sent exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
    pub maintainer_can_modify: bool,
}

/// A change proposal created by the hosted service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedProposal {
    pub number: u64,
    pub html_url: String,
}

/// Terminal state of a successful `fixbot run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// An open proposal from the deterministic branch already exists.
    AlreadyProposed { branch: String, number: u64 },
    /// The fix tool left the working copy clean.
    NoChanges { branch: String },
    /// Changes were committed, pushed, and proposed.
    Proposed {
        branch: String,
        number: u64,
        url: String,
        changed_paths: Vec<String>,
    },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::AlreadyProposed { branch, number } => {
                write!(f, "already proposed: branch={branch} proposal=#{number}")
            }
            RunOutcome::NoChanges { branch } => write!(f, "no changes: branch={branch}"),
            RunOutcome::Proposed {
                branch,
                number,
                url,
                changed_paths,
            } => write!(
                f,
                "proposed: branch={branch} proposal=#{number} files={} url={url}",
                changed_paths.len()
            ),
        }
    }
}

/// Result of `fixbot plan`: what a run would target, without mutating anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanReport {
    pub plan: RevisionPlan,
    pub existing: Option<OpenProposal>,
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plan: base={} head={} branch={}",
            self.plan.default_branch, self.plan.head_commit, self.plan.proposal_branch
        )?;
        match &self.existing {
            Some(existing) => write!(f, " existing=#{}", existing.number),
            None => write!(f, " existing=none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_displays_as_owner_slash_name() {
        assert_eq!(RepositoryIdentity::new("infra", "app").to_string(), "infra/app");
    }

    #[test]
    fn proposal_request_serializes_github_field_names() {
        let request = ProposalRequest {
            title: "Bot Suggestions".to_string(),
            head: "suggestions-abc123".to_string(),
            base: "main".to_string(),
            body: "Bot Suggestions".to_string(),
            maintainer_can_modify: true,
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["head"], "suggestions-abc123");
        assert_eq!(value["base"], "main");
        assert_eq!(value["maintainer_can_modify"], true);
    }

    #[test]
    fn outcome_display_is_single_line() {
        let outcome = RunOutcome::Proposed {
            branch: "suggestions-abc123".to_string(),
            number: 7,
            url: "https://github.com/infra/app/pull/7".to_string(),
            changed_paths: vec!["playbook.yml".to_string()],
        };
        let rendered = outcome.to_string();
        assert!(!rendered.contains('\n'));
        assert!(rendered.contains("proposal=#7"));
        assert!(rendered.contains("branch=suggestions-abc123"));
    }
}

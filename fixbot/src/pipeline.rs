//! Orchestration of one fix-and-propose run.
//!
//! Stages run strictly in order and the first failure ends the run:
//!
//! 1. plan: resolve the default branch head and derive the proposal branch
//! 2. dedupe: stop if an open proposal already comes from that branch
//! 3. working copy: shallow clone, create and check out the branch
//! 4. fix: run the fix tool in place
//! 5. publish: if dirty, commit, push, and open exactly one proposal
//!
//! Each stage tags its failure with a [`PipelineError`] category. The working
//! copy is released on every path once it has been acquired.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};

use crate::core::duplicate::find_existing;
use crate::core::plan::build_plan;
use crate::core::types::{OpenProposal, PlanReport, ProposalRequest, RevisionPlan, RunOutcome};
use crate::error::PipelineError;
use crate::io::config::{FixbotConfig, load_config};
use crate::io::env::Environment;
use crate::io::fix_tool::{FixRequest, FixTool};
use crate::io::git::{Git, Signature};
use crate::io::github::RepoHost;
use crate::io::workspace::WorkingCopy;

const REMOTE: &str = "origin";

/// Everything a run needs, resolved once at startup and passed by reference.
#[derive(Debug)]
pub struct Settings {
    pub env: Environment,
    pub config: FixbotConfig,
}

impl Settings {
    /// Resolve the environment, then load the optional config file.
    ///
    /// Runs before any network or working-copy activity.
    pub fn load(config_path: Option<&Path>) -> Result<Self, PipelineError> {
        let env = Environment::from_process().map_err(PipelineError::Configuration)?;
        let config = load_config(config_path).map_err(PipelineError::Configuration)?;
        Ok(Self { env, config })
    }
}

/// Resolve what `run` would target and whether it is already proposed.
///
/// Read-only: no clone, no push, no proposal.
pub fn plan<H: RepoHost>(settings: &Settings, host: &H) -> Result<PlanReport, PipelineError> {
    let plan = plan_revision(settings, host)?;
    let existing = detect_duplicate(settings, host, &plan)?;
    Ok(PlanReport { plan, existing })
}

/// Execute the full pipeline once.
pub fn run<H: RepoHost, F: FixTool>(
    settings: &Settings,
    host: &H,
    fix_tool: &F,
) -> Result<RunOutcome, PipelineError> {
    let plan = plan_revision(settings, host)?;

    if let Some(existing) = detect_duplicate(settings, host, &plan)? {
        info!(
            branch = %plan.proposal_branch,
            number = existing.number,
            "a proposal already exists for this revision"
        );
        return Ok(RunOutcome::AlreadyProposed {
            branch: plan.proposal_branch,
            number: existing.number,
        });
    }

    let copy = prepare_working_copy(settings, &plan)?;
    let outcome = fix_and_publish(settings, host, fix_tool, &plan, &copy);
    copy.release();
    outcome
}

#[instrument(skip_all, fields(repo = %settings.env.repository))]
fn plan_revision<H: RepoHost>(settings: &Settings, host: &H) -> Result<RevisionPlan, PipelineError> {
    let repo = &settings.env.repository;
    let metadata = host
        .repository(repo)
        .with_context(|| format!("fetch repository {repo}"))
        .map_err(PipelineError::UpstreamApi)?;
    let head_commit = host
        .resolve_branch_head(repo, &metadata.default_branch)
        .with_context(|| format!("resolve heads/{} of {repo}", metadata.default_branch))
        .map_err(PipelineError::UpstreamApi)?;

    let plan = build_plan(&settings.config.branch_prefix, metadata, head_commit);
    info!(
        base = %plan.default_branch,
        head = %plan.head_commit,
        branch = %plan.proposal_branch,
        "revision planned"
    );
    Ok(plan)
}

/// A failed listing is fatal: proceeding blind could open a duplicate proposal.
#[instrument(skip_all, fields(branch = %plan.proposal_branch))]
fn detect_duplicate<H: RepoHost>(
    settings: &Settings,
    host: &H,
    plan: &RevisionPlan,
) -> Result<Option<OpenProposal>, PipelineError> {
    let repo = &settings.env.repository;
    let open = host
        .list_open_proposals(repo, &plan.default_branch)
        .with_context(|| format!("list open proposals of {repo} into {}", plan.default_branch))
        .map_err(PipelineError::UpstreamApi)?;
    Ok(find_existing(&open, &plan.proposal_branch).cloned())
}

/// Acquire, clone, and branch. On error the partially built copy is dropped
/// (and its directory removed) before the error propagates.
#[instrument(skip_all, fields(branch = %plan.proposal_branch))]
fn prepare_working_copy(settings: &Settings, plan: &RevisionPlan) -> Result<WorkingCopy, PipelineError> {
    let config = &settings.config;
    let token = SecretString::from(settings.env.token.expose_secret().to_string());
    let copy = WorkingCopy::acquire(config.workspace_root.as_deref(), |path: &Path| {
        Git::new(path)
            .with_timeout(config.git_timeout())
            .with_output_limit(config.git_output_limit_bytes)
            .with_token(token)
    })
    .map_err(PipelineError::Clone)?;

    let cloned_head = copy
        .populate(&plan.clone_url, &plan.default_branch)
        .with_context(|| format!("clone {}", settings.env.repository))
        .map_err(PipelineError::Clone)?;
    if cloned_head != plan.head_commit {
        warn!(
            planned = %plan.head_commit,
            cloned = %cloned_head,
            "default branch moved after planning; branching from the cloned commit"
        );
    }

    copy.git()
        .checkout_new_branch(&plan.proposal_branch)
        .with_context(|| format!("create branch {}", plan.proposal_branch))
        .map_err(PipelineError::GitOperation)?;
    Ok(copy)
}

fn fix_and_publish<H: RepoHost, F: FixTool>(
    settings: &Settings,
    host: &H,
    fix_tool: &F,
    plan: &RevisionPlan,
    copy: &WorkingCopy,
) -> Result<RunOutcome, PipelineError> {
    let config = &settings.config;
    fix_tool
        .run(&FixRequest {
            target: copy.path().to_path_buf(),
            timeout: config.fix_tool_timeout(),
        })
        .context("fix tool")
        .map_err(PipelineError::Execution)?;

    let git = copy.git();
    let changes = git
        .status_porcelain()
        .context("inspect working copy status")
        .map_err(PipelineError::GitOperation)?;
    if changes.is_empty() {
        info!(branch = %plan.proposal_branch, "fix tool made no changes");
        return Ok(RunOutcome::NoChanges {
            branch: plan.proposal_branch.clone(),
        });
    }
    let changed_paths: Vec<String> = changes.into_iter().map(|entry| entry.path).collect();
    info!(files = changed_paths.len(), "fix tool changed files");

    commit_changes(config, git)?;
    push_branch(git, &plan.proposal_branch)?;

    let request = ProposalRequest {
        title: config.proposal.title.clone(),
        head: plan.proposal_branch.clone(),
        base: plan.default_branch.clone(),
        body: config.proposal.body.clone(),
        maintainer_can_modify: true,
    };
    let created = host
        .create_proposal(&settings.env.repository, &request)
        .with_context(|| format!("open proposal {} -> {}", request.head, request.base))
        .map_err(PipelineError::Publish)?;
    info!(number = created.number, url = %created.html_url, "proposal opened");

    Ok(RunOutcome::Proposed {
        branch: plan.proposal_branch.clone(),
        number: created.number,
        url: created.html_url,
        changed_paths,
    })
}

fn commit_changes(config: &FixbotConfig, git: &Git) -> Result<(), PipelineError> {
    let signature = Signature {
        name: config.proposal.author_name.clone(),
        email: config.proposal.author_email.clone(),
    };
    git.add_all()
        .and_then(|()| git.commit_as(&config.proposal.commit_message, &signature, Utc::now()))
        .context("commit fixes")
        .map_err(PipelineError::GitOperation)
}

/// Push the proposal branch, force-updating it if an earlier run already
/// pushed it but never opened the proposal.
fn push_branch(git: &Git, branch: &str) -> Result<(), PipelineError> {
    let exists = git
        .remote_branch_exists(REMOTE, branch)
        .with_context(|| format!("check remote branch {branch}"))
        .map_err(PipelineError::GitOperation)?;
    if exists {
        warn!(branch, "remote branch left by an earlier run, force-updating");
    }
    git.push_branch(REMOTE, branch, exists)
        .with_context(|| format!("push {branch}"))
        .map_err(PipelineError::GitOperation)
}

//! End-to-end pipeline scenarios.
//!
//! These tests drive `pipeline::run` against a real git remote (a bare
//! repository over `file://`) and a recording fake of the hosted API, and check
//! which calls happen, what lands on the remote, and that the working copy is
//! gone afterwards.

use std::fs;
use std::path::Path;

use fixbot::core::types::RunOutcome;
use fixbot::error::PipelineError;
use fixbot::pipeline::{self, Settings};
use fixbot::test_support::{
    FakeHost, HostCall, ScriptedFix, ScriptedFixTool, TestRemote, settings,
};

const FIXED_PLAYBOOK: &str = "---\n- hosts: all\n  tasks: []\n";

fn fixes_playbook() -> ScriptedFixTool {
    ScriptedFixTool::new(ScriptedFix::Write {
        path: "playbook.yml".to_string(),
        contents: FIXED_PLAYBOOK.to_string(),
    })
}

fn workspace_entries(root: &Path) -> usize {
    fs::read_dir(root).expect("read workspace root").count()
}

fn fixture() -> (TestRemote, tempfile::TempDir, Settings) {
    let remote = TestRemote::new().expect("remote");
    let workspace_root = tempfile::tempdir().expect("tempdir");
    let settings = settings("infra", "app", workspace_root.path());
    (remote, workspace_root, settings)
}

/// Repository infra/app, no open proposals, fixer rewrites `playbook.yml`:
/// one commit by the bot on `suggestions-<head>`, one push, one proposal.
#[test]
fn changes_are_committed_pushed_and_proposed_once() {
    let (remote, workspace_root, settings) = fixture();
    let host = FakeHost::new(remote.metadata(), remote.head());
    let tool = fixes_playbook();

    let outcome = pipeline::run(&settings, &host, &tool).expect("run");
    let branch = format!("suggestions-{}", remote.head());

    match &outcome {
        RunOutcome::Proposed {
            branch: proposed,
            number,
            changed_paths,
            ..
        } => {
            assert_eq!(proposed, &branch);
            assert_eq!(*number, 1);
            assert_eq!(changed_paths, &vec!["playbook.yml".to_string()]);
        }
        other => panic!("expected a proposal, got {other:?}"),
    }

    let created = host.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "Bot Suggestions");
    assert_eq!(created[0].head, branch);
    assert_eq!(created[0].base, "main");
    assert!(created[0].maintainer_can_modify);

    let pushed = remote
        .branch_head(&branch)
        .expect("rev-parse")
        .expect("branch pushed");
    let parent = remote
        .git(&["rev-parse", &format!("{pushed}^")])
        .expect("parent");
    assert_eq!(parent, remote.head(), "exactly one commit on top of head");
    let author = remote
        .git(&["log", "-1", "--format=%an <%ae>", &pushed])
        .expect("author");
    assert_eq!(
        author,
        "Suggestions Bot <suggestions-bot@users.noreply.github.com>"
    );
    let message = remote
        .git(&["log", "-1", "--format=%s", &pushed])
        .expect("message");
    assert_eq!(message, "bot recommendations");
    let contents = remote
        .git(&["show", &format!("{pushed}:playbook.yml")])
        .expect("show");
    assert_eq!(format!("{contents}\n"), FIXED_PLAYBOOK);

    assert_eq!(workspace_entries(workspace_root.path()), 0);
    for target in tool.targets() {
        assert!(!target.exists());
    }
}

/// Same repository and commit with `suggestions-<head>` already open: nothing
/// past the listing call happens, not even a clone.
#[test]
fn existing_proposal_short_circuits_before_clone() {
    let (remote, workspace_root, settings) = fixture();
    let branch = format!("suggestions-{}", remote.head());
    let host = FakeHost::new(remote.metadata(), remote.head())
        .with_open(3, "unrelated")
        .with_open(9, &branch);
    let tool = fixes_playbook();

    let outcome = pipeline::run(&settings, &host, &tool).expect("run");

    assert_eq!(
        outcome,
        RunOutcome::AlreadyProposed {
            branch: branch.clone(),
            number: 9
        }
    );
    assert_eq!(
        host.calls(),
        vec![
            HostCall::Repository,
            HostCall::ResolveBranchHead {
                branch: "main".to_string()
            },
            HostCall::ListOpenProposals {
                base: "main".to_string()
            },
        ]
    );
    assert!(tool.targets().is_empty(), "fix tool must not run");
    assert_eq!(workspace_entries(workspace_root.path()), 0);
    assert_eq!(remote.branch_head(&branch).expect("rev-parse"), None);
}

/// Fixer exits zero and leaves the tree untouched: no commit, push, or proposal.
#[test]
fn clean_working_copy_publishes_nothing() {
    let (remote, workspace_root, settings) = fixture();
    let host = FakeHost::new(remote.metadata(), remote.head());
    let tool = ScriptedFixTool::new(ScriptedFix::NoChange);

    let outcome = pipeline::run(&settings, &host, &tool).expect("run");
    let branch = format!("suggestions-{}", remote.head());

    assert_eq!(outcome, RunOutcome::NoChanges { branch: branch.clone() });
    assert_eq!(tool.targets().len(), 1);
    assert!(host.created().is_empty());
    assert_eq!(remote.branch_head(&branch).expect("rev-parse"), None);
    assert_eq!(workspace_entries(workspace_root.path()), 0);
}

/// Fixer fails: execution error, nothing published, working copy removed.
#[test]
fn fix_tool_failure_is_fatal_and_cleans_up() {
    let (remote, workspace_root, settings) = fixture();
    let host = FakeHost::new(remote.metadata(), remote.head());
    let tool = ScriptedFixTool::new(ScriptedFix::Fail);

    let err = pipeline::run(&settings, &host, &tool).unwrap_err();

    assert!(matches!(err, PipelineError::Execution(_)), "{err}");
    assert_eq!(err.exit_code(), fixbot::exit_codes::EXECUTION);
    let targets = tool.targets();
    assert_eq!(targets.len(), 1);
    assert!(!targets[0].exists(), "working copy must be removed");
    assert_eq!(workspace_entries(workspace_root.path()), 0);
    assert!(host.created().is_empty());
}

/// New files produced by the fixer count as changes and are committed.
#[test]
fn untracked_output_is_committed() {
    let (remote, _workspace_root, settings) = fixture();
    let host = FakeHost::new(remote.metadata(), remote.head());
    let tool = ScriptedFixTool::new(ScriptedFix::Write {
        path: ".ansible-lint-ignore".to_string(),
        contents: "playbook.yml yaml[truthy]\n".to_string(),
    });

    let outcome = pipeline::run(&settings, &host, &tool).expect("run");
    let branch = format!("suggestions-{}", remote.head());

    assert!(matches!(outcome, RunOutcome::Proposed { .. }), "{outcome:?}");
    let pushed = remote
        .branch_head(&branch)
        .expect("rev-parse")
        .expect("branch pushed");
    let files = remote
        .git(&["diff-tree", "--no-commit-id", "--name-only", "-r", &pushed])
        .expect("diff-tree");
    assert_eq!(files, ".ansible-lint-ignore");
}

/// Listing failures are fatal rather than treated as "no duplicate".
#[test]
fn proposal_listing_failure_is_fatal() {
    let (remote, workspace_root, settings) = fixture();
    let mut host = FakeHost::new(remote.metadata(), remote.head());
    host.fail_list = true;
    let tool = fixes_playbook();

    let err = pipeline::run(&settings, &host, &tool).unwrap_err();

    assert!(matches!(err, PipelineError::UpstreamApi(_)), "{err}");
    assert!(err.to_string().contains("list open proposals"), "{err}");
    assert!(tool.targets().is_empty());
    assert_eq!(workspace_entries(workspace_root.path()), 0);
}

#[test]
fn metadata_failure_is_fatal() {
    let (remote, _workspace_root, settings) = fixture();
    let mut host = FakeHost::new(remote.metadata(), remote.head());
    host.fail_metadata = true;

    let err = pipeline::run(&settings, &host, &fixes_playbook()).unwrap_err();

    assert!(matches!(err, PipelineError::UpstreamApi(_)), "{err}");
    assert_eq!(host.calls(), vec![HostCall::Repository]);
}

#[test]
fn unreachable_clone_url_is_a_clone_error() {
    let (remote, workspace_root, settings) = fixture();
    let mut metadata = remote.metadata();
    metadata.clone_url = format!("{}-missing", remote.url());
    let host = FakeHost::new(metadata, remote.head());
    let tool = fixes_playbook();

    let err = pipeline::run(&settings, &host, &tool).unwrap_err();

    assert!(matches!(err, PipelineError::Clone(_)), "{err}");
    assert!(tool.targets().is_empty());
    assert_eq!(workspace_entries(workspace_root.path()), 0);
}

/// A push that succeeded before a failed proposal creation is left in place;
/// the next run force-updates the branch and opens the proposal.
#[test]
fn rerun_after_failed_proposal_recovers() {
    let (remote, workspace_root, settings) = fixture();
    let branch = format!("suggestions-{}", remote.head());
    let mut host = FakeHost::new(remote.metadata(), remote.head());
    host.fail_create = true;

    let err = pipeline::run(&settings, &host, &fixes_playbook()).unwrap_err();
    assert!(matches!(err, PipelineError::Publish(_)), "{err}");
    assert!(
        remote.branch_head(&branch).expect("rev-parse").is_some(),
        "branch left on remote"
    );
    assert_eq!(workspace_entries(workspace_root.path()), 0);

    host.fail_create = false;
    let outcome = pipeline::run(&settings, &host, &fixes_playbook()).expect("rerun");

    assert!(matches!(outcome, RunOutcome::Proposed { .. }), "{outcome:?}");
    let second_push = remote
        .branch_head(&branch)
        .expect("rev-parse")
        .expect("branch on remote");
    let parent = remote
        .git(&["rev-parse", &format!("{second_push}^")])
        .expect("parent");
    assert_eq!(parent, remote.head());
    assert_eq!(host.created().len(), 2);
}

/// Once a proposal exists, repeating the run is a no-op.
#[test]
fn second_run_against_same_revision_is_a_noop() {
    let (remote, _workspace_root, settings) = fixture();
    let host = FakeHost::new(remote.metadata(), remote.head());

    let first = pipeline::run(&settings, &host, &fixes_playbook()).expect("first run");
    let second = pipeline::run(&settings, &host, &fixes_playbook()).expect("second run");

    let number = match first {
        RunOutcome::Proposed { number, .. } => number,
        other => panic!("expected a proposal, got {other:?}"),
    };
    assert_eq!(
        second,
        RunOutcome::AlreadyProposed {
            branch: format!("suggestions-{}", remote.head()),
            number
        }
    );
    assert_eq!(host.created().len(), 1);
}

/// A stale branch with no open proposal (e.g. the proposal was closed) is
/// force-updated rather than failing the push.
#[test]
fn stale_remote_branch_is_force_updated() {
    let (remote, _workspace_root, settings) = fixture();
    let branch = format!("suggestions-{}", remote.head());
    remote.create_branch(&branch).expect("stale branch");
    let host = FakeHost::new(remote.metadata(), remote.head());

    let outcome = pipeline::run(&settings, &host, &fixes_playbook()).expect("run");

    assert!(matches!(outcome, RunOutcome::Proposed { .. }), "{outcome:?}");
    let pushed = remote
        .branch_head(&branch)
        .expect("rev-parse")
        .expect("branch");
    assert_ne!(pushed, remote.head());
}

#[test]
fn plan_reports_branch_and_existing_proposal_without_cloning() {
    let (remote, workspace_root, settings) = fixture();
    let branch = format!("suggestions-{}", remote.head());

    let host = FakeHost::new(remote.metadata(), remote.head());
    let report = pipeline::plan(&settings, &host).expect("plan");
    assert_eq!(report.plan.proposal_branch, branch);
    assert_eq!(report.plan.default_branch, "main");
    assert_eq!(report.existing, None);

    let host = FakeHost::new(remote.metadata(), remote.head()).with_open(4, &branch);
    let report = pipeline::plan(&settings, &host).expect("plan");
    assert_eq!(report.existing.map(|existing| existing.number), Some(4));
    assert_eq!(workspace_entries(workspace_root.path()), 0);
}

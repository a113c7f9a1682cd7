//! Test-only fakes and git fixtures.
//!
//! - [`FakeHost`] stands in for the hosted API and records every call.
//! - [`ScriptedFixTool`] edits the working copy directly instead of spawning a tool.
//! - [`TestRemote`] is a bare repository served over `file://`, so the real
//!   git adapter can clone from and push to it.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use secrecy::SecretString;
use tempfile::TempDir;

use crate::core::types::{
    CreatedProposal, OpenProposal, ProposalRequest, RepositoryIdentity, RepositoryMetadata,
};
use crate::io::config::FixbotConfig;
use crate::io::env::Environment;
use crate::io::fix_tool::{FixRequest, FixTool};
use crate::io::github::RepoHost;
use crate::pipeline::Settings;

/// Settings for `owner/name` with the working copy rooted at `workspace_root`.
pub fn settings(owner: &str, name: &str, workspace_root: &Path) -> Settings {
    Settings {
        env: Environment {
            repository: RepositoryIdentity::new(owner, name),
            token: SecretString::from("test-token".to_string()),
        },
        config: FixbotConfig {
            workspace_root: Some(workspace_root.to_path_buf()),
            git_timeout_secs: 60,
            ..FixbotConfig::default()
        },
    }
}

/// Run git in `dir`, returning trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !out.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Initialize a repository on `main` with one committed file.
pub fn init_repo_with_commit(dir: &Path, file: &str, contents: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    git(dir, &["init", "--quiet", "--initial-branch=main"])?;
    git(dir, &["config", "user.name", "Fixture Author"])?;
    git(dir, &["config", "user.email", "fixture@local.invalid"])?;
    git(dir, &["config", "commit.gpgsign", "false"])?;
    fs::write(dir.join(file), contents).with_context(|| format!("write {file}"))?;
    git(dir, &["add", "."])?;
    git(dir, &["commit", "--quiet", "-m", "initial"])?;
    Ok(())
}

/// Bare remote seeded with `playbook.yml` on `main`.
pub struct TestRemote {
    _temp: TempDir,
    bare: PathBuf,
    head: String,
}

impl TestRemote {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let seed = temp.path().join("seed");
        init_repo_with_commit(&seed, "playbook.yml", "- hosts: all\n  tasks: []\n")?;
        fs::write(seed.join("README.md"), "infra app\n").context("write readme")?;
        git(&seed, &["add", "."])?;
        git(&seed, &["commit", "--quiet", "-m", "add readme"])?;
        let head = git(&seed, &["rev-parse", "HEAD"])?;

        let bare = temp.path().join("remote.git");
        let bare_str = bare
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 temp path"))?;
        git(temp.path(), &["clone", "--quiet", "--bare", "seed", bare_str])?;

        Ok(Self {
            _temp: temp,
            bare,
            head,
        })
    }

    /// `file://` URL; plain paths would make git ignore `--depth`.
    pub fn url(&self) -> String {
        format!("file://{}", self.bare.display())
    }

    /// Head commit of `main`.
    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn metadata(&self) -> RepositoryMetadata {
        RepositoryMetadata {
            default_branch: "main".to_string(),
            clone_url: self.url(),
        }
    }

    /// Commit at `refs/heads/<branch>`, if the branch exists.
    pub fn branch_head(&self, branch: &str) -> Result<Option<String>> {
        let refname = format!("refs/heads/{branch}");
        let out = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &refname])
            .current_dir(&self.bare)
            .output()
            .context("spawn git rev-parse")?;
        if out.status.success() {
            Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Run git inside the bare repository.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git(&self.bare, args)
    }

    /// Create `branch` at `main` directly on the remote, as a prior run's push would.
    pub fn create_branch(&self, branch: &str) -> Result<()> {
        self.git(&["branch", branch, "main"])?;
        Ok(())
    }
}

/// A recorded hosted-API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Repository,
    ResolveBranchHead { branch: String },
    ListOpenProposals { base: String },
    CreateProposal(ProposalRequest),
}

/// In-memory hosted API.
///
/// Created proposals are added to the open list, so a second run against the
/// same fake sees them.
pub struct FakeHost {
    metadata: RepositoryMetadata,
    head: String,
    open: RefCell<Vec<OpenProposal>>,
    calls: RefCell<Vec<HostCall>>,
    next_number: Cell<u64>,
    pub fail_metadata: bool,
    pub fail_list: bool,
    pub fail_create: bool,
}

impl FakeHost {
    pub fn new(metadata: RepositoryMetadata, head: impl Into<String>) -> Self {
        Self {
            metadata,
            head: head.into(),
            open: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
            next_number: Cell::new(1),
            fail_metadata: false,
            fail_list: false,
            fail_create: false,
        }
    }

    pub fn with_open(self, number: u64, head_branch: &str) -> Self {
        self.open.borrow_mut().push(OpenProposal {
            number,
            head_branch: head_branch.to_string(),
        });
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn created(&self) -> Vec<ProposalRequest> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                HostCall::CreateProposal(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl RepoHost for FakeHost {
    fn repository(&self, _repo: &RepositoryIdentity) -> Result<RepositoryMetadata> {
        self.record(HostCall::Repository);
        if self.fail_metadata {
            bail!("GET /repos returned 503 Service Unavailable");
        }
        Ok(self.metadata.clone())
    }

    fn resolve_branch_head(&self, _repo: &RepositoryIdentity, branch: &str) -> Result<String> {
        self.record(HostCall::ResolveBranchHead {
            branch: branch.to_string(),
        });
        Ok(self.head.clone())
    }

    fn list_open_proposals(
        &self,
        _repo: &RepositoryIdentity,
        base: &str,
    ) -> Result<Vec<OpenProposal>> {
        self.record(HostCall::ListOpenProposals {
            base: base.to_string(),
        });
        if self.fail_list {
            bail!("GET /pulls returned 502 Bad Gateway");
        }
        Ok(self.open.borrow().clone())
    }

    fn create_proposal(
        &self,
        _repo: &RepositoryIdentity,
        request: &ProposalRequest,
    ) -> Result<CreatedProposal> {
        self.record(HostCall::CreateProposal(request.clone()));
        if self.fail_create {
            bail!("POST /pulls returned 422 Unprocessable Entity");
        }
        let number = self.next_number.get();
        self.next_number.set(number + 1);
        self.open.borrow_mut().push(OpenProposal {
            number,
            head_branch: request.head.clone(),
        });
        Ok(CreatedProposal {
            number,
            html_url: format!("https://example.invalid/pull/{number}"),
        })
    }
}

/// Behavior of a [`ScriptedFixTool`].
#[derive(Debug, Clone)]
pub enum ScriptedFix {
    /// Complete successfully without touching anything.
    NoChange,
    /// Overwrite (or create) `path` relative to the working copy.
    Write { path: String, contents: String },
    /// Exit non-zero.
    Fail,
}

/// Fix tool that applies a fixed edit and remembers where it ran.
pub struct ScriptedFixTool {
    fix: ScriptedFix,
    targets: RefCell<Vec<PathBuf>>,
}

impl ScriptedFixTool {
    pub fn new(fix: ScriptedFix) -> Self {
        Self {
            fix,
            targets: RefCell::new(Vec::new()),
        }
    }

    /// Working-copy paths the tool was invoked on, in order.
    pub fn targets(&self) -> Vec<PathBuf> {
        self.targets.borrow().clone()
    }
}

impl FixTool for ScriptedFixTool {
    fn run(&self, request: &FixRequest) -> Result<()> {
        self.targets.borrow_mut().push(request.target.clone());
        match &self.fix {
            ScriptedFix::NoChange => Ok(()),
            ScriptedFix::Write { path, contents } => {
                let full = request.target.join(path);
                fs::write(&full, contents).with_context(|| format!("write {}", full.display()))
            }
            ScriptedFix::Fail => Err(anyhow!("scripted fix tool exited with exit status: 2")),
        }
    }
}
